//! QEMU fw_cfg client.
//!
//! The firmware-configuration device carries named blobs (and devices
//! like ramfb) into the guest. Two access modes are supported:
//!
//! - **Traditional**: write a big-endian 16-bit selector, then read the
//!   data register, which auto-advances by the width of each read.
//! - **DMA**: build a 16-byte big-endian descriptor in kernel memory and
//!   write its physical address (big-endian) to the DMA register; QEMU
//!   clears the control field asynchronously when the transfer finishes.
//!
//! The device window is "device big-endian": every multi-byte value
//! crossing it is byte-swapped in kernel memory first, and descriptors
//! are serialized byte-wise so struct padding can never perturb the
//! layout. The wire-format helpers below are pure and unit tested on the
//! host; only the transport at the bottom touches MMIO.

use bitflags::bitflags;

// ---------------------------------------------------------------------------
// Selectors and wire formats
// ---------------------------------------------------------------------------

/// Well-known selector: device signature ("QEMU").
pub const SELECTOR_SIGNATURE: u16 = 0x0000;
/// Well-known selector: feature bitmap.
pub const SELECTOR_ID: u16 = 0x0001;
/// Well-known selector: file directory.
pub const SELECTOR_FILE_DIR: u16 = 0x0019;

/// Feature-bitmap bit 1: the DMA interface is available.
pub const FEATURE_DMA: u32 = 1 << 1;

/// Value the DMA register yields when read: "QEMU CFG".
pub const DMA_SIGNATURE: u64 = 0x5145_4D55_2043_4647;

/// Register offsets from the fw_cfg MMIO base.
pub const REG_DATA: usize = 0x00;
pub const REG_SELECTOR: usize = 0x08;
pub const REG_DMA: usize = 0x10;

/// One directory entry is 64 bytes on the wire.
pub const DIR_ENTRY_SIZE: usize = 64;
/// File names occupy 56 NUL-padded bytes of the entry.
pub const FILE_NAME_LEN: usize = 56;

bitflags! {
    /// Control-field flag bits of the DMA descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaControl: u32 {
        /// Set by the device when the transfer failed.
        const ERROR = 1 << 0;
        /// Read the selected item into guest memory.
        const READ = 1 << 1;
        /// Advance the item cursor without transferring.
        const SKIP = 1 << 2;
        /// Select the item in the high 16 bits first.
        const SELECT = 1 << 3;
        /// Write guest memory to the selected item.
        const WRITE = 1 << 4;
    }
}

/// Pack a selector and flag bits into the descriptor control word.
pub const fn dma_control(selector: u16, flags: DmaControl) -> u32 {
    ((selector as u32) << 16) | flags.bits()
}

/// Serialize a DMA descriptor: `{control, length, address}`, all
/// big-endian.
pub fn encode_dma_descriptor(control: u32, length: u32, address: u64) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&control.to_be_bytes());
    bytes[4..8].copy_from_slice(&length.to_be_bytes());
    bytes[8..16].copy_from_slice(&address.to_be_bytes());
    bytes
}

/// A parsed directory entry.
#[derive(Debug, Clone, Copy)]
pub struct FwCfgFile {
    pub size: u32,
    pub select: u16,
    name: [u8; FILE_NAME_LEN],
}

impl FwCfgFile {
    /// The NUL-terminated entry name as a string slice.
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILE_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

/// Decode one 64-byte directory entry:
/// `{size: u32, select: u16, reserved: u16, name: [u8; 56]}`, big-endian.
pub fn parse_dir_entry(entry: &[u8; DIR_ENTRY_SIZE]) -> FwCfgFile {
    let size = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]);
    let select = u16::from_be_bytes([entry[4], entry[5]]);
    let mut name = [0u8; FILE_NAME_LEN];
    name.copy_from_slice(&entry[8..DIR_ENTRY_SIZE]);
    FwCfgFile { size, select, name }
}

/// Directory-name comparison. Some firmware spells paths with a leading
/// slash, so `"etc/ramfb"` and `"/etc/ramfb"` are the same file.
pub fn file_name_matches(entry_name: &str, wanted: &str) -> bool {
    let entry_name = entry_name.strip_prefix('/').unwrap_or(entry_name);
    let wanted = wanted.strip_prefix('/').unwrap_or(wanted);
    entry_name == wanted
}

// ---------------------------------------------------------------------------
// MMIO transport
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use transport::{with_fw_cfg, FwCfg};

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod transport {
    use spin::Mutex;

    use super::*;
    use crate::arch::aarch64::mmio;
    use crate::error::{KernelError, KernelResult};
    use crate::platform;
    use crate::utils::endian;

    /// Completion-poll bound: 50 000 outer iterations with a short pause
    /// each, far beyond any real fw_cfg latency.
    const DMA_SPIN_LIMIT: usize = 50_000;
    const DMA_SPIN_PAUSE: usize = 16;

    /// Upper bound on directory entries examined; QEMU ships a few dozen.
    const MAX_DIR_ENTRIES: u32 = 512;

    /// 16-byte-aligned home for an in-flight DMA descriptor. Device
    /// memory requires aligned accesses, and QEMU mutates the control
    /// word in place.
    #[repr(C, align(16))]
    struct DmaDescriptor {
        bytes: [u8; 16],
    }

    /// fw_cfg device handle.
    pub struct FwCfg {
        base: usize,
        dma_supported: bool,
    }

    impl FwCfg {
        /// Bind the device and probe for DMA support: the feature bitmap
        /// must advertise it and the DMA register must read back the
        /// "QEMU CFG" signature. Without both, the client stays in
        /// traditional mode.
        fn probe(base: usize) -> Self {
            let mut fw_cfg = Self {
                base,
                dma_supported: false,
            };

            fw_cfg.select(SELECTOR_ID);
            let mut feature_bytes = [0u8; 4];
            fw_cfg.read_bytes(&mut feature_bytes);
            // The feature bitmap is little-endian, unlike the directory.
            let features = u32::from_le_bytes(feature_bytes);

            // SAFETY: REG_DMA is inside the fw_cfg MMIO window configured
            // by the platform; reading it has no side effect.
            let raw = unsafe { mmio::read64(base + REG_DMA) };
            let signature = endian::swap64(raw);

            fw_cfg.dma_supported = features & FEATURE_DMA != 0 && signature == DMA_SIGNATURE;
            fw_cfg
        }

        pub fn dma_supported(&self) -> bool {
            self.dma_supported
        }

        /// Select an item; subsequent data-register reads stream its
        /// contents from the start.
        fn select(&self, selector: u16) {
            // SAFETY: REG_SELECTOR is inside the fw_cfg MMIO window; the
            // device expects the selector big-endian.
            unsafe { mmio::write16(self.base + REG_SELECTOR, endian::swap16(selector)) };
            mmio::dsb_sy();
        }

        /// Fill `buf` from the data register, one byte per read; the
        /// device cursor advances by the read width.
        fn read_bytes(&self, buf: &mut [u8]) {
            for byte in buf.iter_mut() {
                // SAFETY: REG_DATA is inside the fw_cfg MMIO window.
                *byte = unsafe { mmio::read8(self.base + REG_DATA) };
            }
        }

        fn read_u32_be(&self) -> u32 {
            let mut bytes = [0u8; 4];
            self.read_bytes(&mut bytes);
            u32::from_be_bytes(bytes)
        }

        /// Locate a file by name and return its selector.
        pub fn find_file(&self, name: &str) -> KernelResult<u16> {
            self.select(SELECTOR_FILE_DIR);
            // Reading the count advances the device cursor to the first
            // 64-byte entry; the entries stream directly after it.
            let count = self.read_u32_be().min(MAX_DIR_ENTRIES);

            let mut entry = [0u8; DIR_ENTRY_SIZE];
            for _ in 0..count {
                self.read_bytes(&mut entry);
                let file = parse_dir_entry(&entry);
                if file_name_matches(file.name(), name) {
                    return Ok(file.select);
                }
            }
            Err(KernelError::NotFound {
                resource: "fw_cfg file",
            })
        }

        /// Write `data` to the item at `selector` via DMA.
        pub fn dma_write(&self, selector: u16, data: &[u8]) -> KernelResult<()> {
            if !self.dma_supported {
                return Err(KernelError::NotInitialized {
                    subsystem: "fw_cfg DMA",
                });
            }
            if data.len() > u32::MAX as usize {
                return Err(KernelError::InvalidArgument {
                    name: "data",
                    value: "transfer exceeds the 32-bit length field",
                });
            }

            let control = dma_control(selector, DmaControl::SELECT | DmaControl::WRITE);
            self.dma_transfer(control, data.len() as u32, data.as_ptr() as u64)
        }

        /// Run one DMA descriptor to completion.
        fn dma_transfer(&self, control: u32, length: u32, address: u64) -> KernelResult<()> {
            let descriptor = DmaDescriptor {
                bytes: encode_dma_descriptor(control, length, address),
            };
            let descriptor_addr = descriptor.bytes.as_ptr() as u64;

            // The descriptor (and the payload it points at) must be
            // visible before the device sees the doorbell.
            mmio::dsb_sy();
            // SAFETY: REG_DMA is inside the fw_cfg MMIO window; writing
            // the descriptor's physical address (big-endian) starts the
            // transfer. The kernel runs identity-mapped, so the virtual
            // address is the physical one.
            unsafe { mmio::write64(self.base + REG_DMA, endian::swap64(descriptor_addr)) };

            for _ in 0..DMA_SPIN_LIMIT {
                // QEMU rewrites the control word asynchronously; order
                // the read after the device's store.
                mmio::dsb_sy();
                // SAFETY: the descriptor is alive and 4-byte aligned; a
                // volatile read observes the device's in-place update.
                let raw = unsafe {
                    core::ptr::read_volatile(descriptor.bytes.as_ptr().cast::<u32>())
                };
                let control = endian::swap32(raw);

                if control & !DmaControl::ERROR.bits() == 0 {
                    if control & DmaControl::ERROR.bits() != 0 {
                        return Err(KernelError::DeviceError {
                            device: "fw_cfg",
                            code: control,
                        });
                    }
                    return Ok(());
                }
                for _ in 0..DMA_SPIN_PAUSE {
                    core::hint::spin_loop();
                }
            }

            Err(KernelError::DeviceTimeout {
                device: "fw_cfg",
                operation: "DMA completion wait",
            })
        }
    }

    lazy_static::lazy_static! {
        /// The platform fw_cfg device; DMA support is probed on first use.
        static ref FW_CFG: Mutex<FwCfg> = Mutex::new(FwCfg::probe(platform::FWCFG_BASE));
    }

    /// Run a closure against the platform fw_cfg device.
    pub fn with_fw_cfg<R, F: FnOnce(&FwCfg) -> R>(f: F) -> R {
        f(&FW_CFG.lock())
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn dma_descriptor_layout_is_big_endian() {
        let control = dma_control(0x0022, DmaControl::SELECT | DmaControl::WRITE);
        assert_eq!(control, 0x0022_0018);

        let bytes = encode_dma_descriptor(control, 28, 0x4123_4560);
        assert_eq!(&bytes[0..4], &[0x00, 0x22, 0x00, 0x18]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x1C]);
        assert_eq!(
            &bytes[8..16],
            &[0x00, 0x00, 0x00, 0x00, 0x41, 0x23, 0x45, 0x60]
        );
    }

    #[test]
    fn control_flag_bits() {
        assert_eq!(DmaControl::ERROR.bits(), 1);
        assert_eq!(DmaControl::READ.bits(), 2);
        assert_eq!(DmaControl::SKIP.bits(), 4);
        assert_eq!(DmaControl::SELECT.bits(), 8);
        assert_eq!(DmaControl::WRITE.bits(), 16);
    }

    #[test]
    fn parses_directory_entries() {
        let mut entry = [0u8; DIR_ENTRY_SIZE];
        entry[0..4].copy_from_slice(&28u32.to_be_bytes());
        entry[4..6].copy_from_slice(&0x0022u16.to_be_bytes());
        entry[8..17].copy_from_slice(b"etc/ramfb");

        let file = parse_dir_entry(&entry);
        assert_eq!(file.size, 28);
        assert_eq!(file.select, 0x0022);
        assert_eq!(file.name(), "etc/ramfb");
    }

    #[test]
    fn unterminated_name_uses_the_full_field() {
        let mut entry = [0u8; DIR_ENTRY_SIZE];
        for b in entry[8..].iter_mut() {
            *b = b'x';
        }
        let file = parse_dir_entry(&entry);
        assert_eq!(file.name().len(), FILE_NAME_LEN);
    }

    #[test]
    fn name_matching_tolerates_a_leading_slash() {
        assert!(file_name_matches("etc/ramfb", "etc/ramfb"));
        assert!(file_name_matches("/etc/ramfb", "etc/ramfb"));
        assert!(file_name_matches("etc/ramfb", "/etc/ramfb"));
        assert!(!file_name_matches("etc/ramfb-extra", "etc/ramfb"));
        assert!(!file_name_matches("opt/ramfb", "etc/ramfb"));
    }

    #[test]
    fn signature_spells_qemu_cfg() {
        assert_eq!(&DMA_SIGNATURE.to_be_bytes(), b"QEMU CFG");
    }
}
