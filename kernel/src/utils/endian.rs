//! Byte-order helpers for the fw_cfg device window.
//!
//! The fw_cfg registers are "device big-endian" while the kernel runs
//! little-endian, so every value crossing a register (the selector, the
//! DMA doorbell and signature, the descriptor control word) is one byte
//! swap away from its native form. These wrappers keep that intent
//! visible at the call site; multi-byte record payloads are serialized
//! byte-wise instead and never go through an integer swap.

/// Swap the byte order of a 16-bit value.
#[inline]
pub const fn swap16(value: u16) -> u16 {
    value.swap_bytes()
}

/// Swap the byte order of a 32-bit value.
#[inline]
pub const fn swap32(value: u32) -> u32 {
    value.swap_bytes()
}

/// Swap the byte order of a 64-bit value.
#[inline]
pub const fn swap64(value: u64) -> u64 {
    value.swap_bytes()
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn swaps_are_involutions() {
        for x in [0u16, 1, 0x1234, 0xFFFF] {
            assert_eq!(swap16(swap16(x)), x);
        }
        for x in [0u32, 1, 0x1234_5678, u32::MAX] {
            assert_eq!(swap32(swap32(x)), x);
        }
        for x in [0u64, 1, 0x0102_0304_0506_0708, u64::MAX] {
            assert_eq!(swap64(swap64(x)), x);
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(swap16(0x1234), 0x3412);
        assert_eq!(swap32(0x1234_5678), 0x7856_3412);
        assert_eq!(swap64(0x0102_0304_0506_0708), 0x0807_0605_0403_0201);
        // The fw_cfg DMA signature spells "QEMU CFG" on the wire.
        assert_eq!(0x5145_4D55_2043_4647u64.to_be_bytes(), *b"QEMU CFG");
    }
}
