//! ESR_EL1 syndrome decoding.
//!
//! Pure bit-field decoding of the Exception Syndrome Register, kept
//! separate from the exception entry path so it can be unit tested on the
//! host. Field layout per the ARMv8-A architecture: EC in bits [31:26],
//! IL in bit [25], ISS in bits [24:0].

const ESR_EC_SHIFT: u64 = 26;
const ESR_EC_MASK: u64 = 0x3F;
const ESR_ISS_MASK: u64 = 0x01FF_FFFF;

/// Exception classes the dispatcher knows how to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionClass {
    /// EC 0x00 -- no syndrome information.
    Unknown,
    /// EC 0x01 -- trapped WFI/WFE.
    WfxTrap,
    /// EC 0x0E -- illegal execution state.
    IllegalExecution,
    /// EC 0x15 -- SVC from AArch64.
    Svc64,
    /// EC 0x18 -- trapped MSR/MRS/system instruction.
    MsrMrsTrap,
    /// EC 0x20 / 0x21 -- instruction abort (lower EL / same EL).
    InstructionAbort { same_el: bool },
    /// EC 0x24 / 0x25 -- data abort (lower EL / same EL); FAR_EL1 is valid.
    DataAbort { same_el: bool },
    /// EC 0x30 / 0x31 -- hardware breakpoint (lower EL / same EL).
    Breakpoint { same_el: bool },
    /// EC 0x3C -- BRK instruction.
    BrkInstruction,
    /// Everything else; the raw EC is preserved for the fatal dump.
    Other(u8),
}

impl ExceptionClass {
    /// Decode the EC field of a raw ESR_EL1 value.
    pub fn from_esr(esr: u64) -> Self {
        match Esr(esr).ec() {
            0x00 => Self::Unknown,
            0x01 => Self::WfxTrap,
            0x0E => Self::IllegalExecution,
            0x15 => Self::Svc64,
            0x18 => Self::MsrMrsTrap,
            0x20 => Self::InstructionAbort { same_el: false },
            0x21 => Self::InstructionAbort { same_el: true },
            0x24 => Self::DataAbort { same_el: false },
            0x25 => Self::DataAbort { same_el: true },
            0x30 => Self::Breakpoint { same_el: false },
            0x31 => Self::Breakpoint { same_el: true },
            0x3C => Self::BrkInstruction,
            other => Self::Other(other),
        }
    }
}

impl core::fmt::Display for ExceptionClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::WfxTrap => write!(f, "trapped WFI/WFE"),
            Self::IllegalExecution => write!(f, "illegal execution state"),
            Self::Svc64 => write!(f, "SVC (AArch64)"),
            Self::MsrMrsTrap => write!(f, "trapped MSR/MRS"),
            Self::InstructionAbort { same_el: true } => write!(f, "instruction abort (EL1)"),
            Self::InstructionAbort { same_el: false } => write!(f, "instruction abort (EL0)"),
            Self::DataAbort { same_el: true } => write!(f, "data abort (EL1)"),
            Self::DataAbort { same_el: false } => write!(f, "data abort (EL0)"),
            Self::Breakpoint { .. } => write!(f, "breakpoint"),
            Self::BrkInstruction => write!(f, "BRK instruction"),
            Self::Other(ec) => write!(f, "EC 0x{:02x}", ec),
        }
    }
}

/// A raw ESR_EL1 value with field accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Esr(pub u64);

impl Esr {
    /// Exception class, bits [31:26].
    pub fn ec(self) -> u8 {
        ((self.0 >> ESR_EC_SHIFT) & ESR_EC_MASK) as u8
    }

    /// Instruction-specific syndrome, bits [24:0].
    pub fn iss(self) -> u32 {
        (self.0 & ESR_ISS_MASK) as u32
    }

    /// The decoded exception class.
    pub fn class(self) -> ExceptionClass {
        ExceptionClass::from_esr(self.0)
    }

    /// SVC immediate, ISS bits [15:0]. Only meaningful for `Svc64`.
    pub fn svc_immediate(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// For aborts: whether the access was a write (WnR, ISS bit 6).
    pub fn abort_is_write(self) -> bool {
        self.0 & (1 << 6) != 0
    }

    /// For aborts: the fault status code, ISS bits [5:0].
    pub fn fault_status(self) -> u8 {
        (self.0 & 0x3F) as u8
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn esr_with_ec(ec: u64) -> u64 {
        ec << 26
    }

    #[test]
    fn decodes_known_classes() {
        assert_eq!(ExceptionClass::from_esr(0), ExceptionClass::Unknown);
        assert_eq!(
            ExceptionClass::from_esr(esr_with_ec(0x01)),
            ExceptionClass::WfxTrap
        );
        assert_eq!(
            ExceptionClass::from_esr(esr_with_ec(0x15)),
            ExceptionClass::Svc64
        );
        assert_eq!(
            ExceptionClass::from_esr(esr_with_ec(0x25)),
            ExceptionClass::DataAbort { same_el: true }
        );
        assert_eq!(
            ExceptionClass::from_esr(esr_with_ec(0x20)),
            ExceptionClass::InstructionAbort { same_el: false }
        );
        assert_eq!(
            ExceptionClass::from_esr(esr_with_ec(0x3F)),
            ExceptionClass::Other(0x3F)
        );
    }

    #[test]
    fn svc_immediate_is_low_16_bits() {
        let esr = esr_with_ec(0x15) | 0x00AB;
        assert_eq!(Esr(esr).class(), ExceptionClass::Svc64);
        assert_eq!(Esr(esr).svc_immediate(), 0xAB);
    }

    #[test]
    fn abort_fields() {
        // Data abort from EL1, write access, translation fault level 3.
        let esr = esr_with_ec(0x25) | (1 << 6) | 0x07;
        let esr = Esr(esr);
        assert_eq!(esr.class(), ExceptionClass::DataAbort { same_el: true });
        assert!(esr.abort_is_write());
        assert_eq!(esr.fault_status(), 0x07);
    }
}
