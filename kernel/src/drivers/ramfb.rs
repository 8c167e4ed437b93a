//! QEMU ramfb display device.
//!
//! ramfb scans a guest-RAM pixel buffer out to the display. Bringing it
//! up is a handshake over fw_cfg: allocate the buffer, fill the 28-byte
//! big-endian configuration record, and DMA-write it to the `etc/ramfb`
//! selector. Requires `-device ramfb` on the QEMU command line.

/// DRM fourcc for XRGB8888: 'X' 'R' '2' '4'.
pub const FOURCC_XR24: u32 = 0x3432_5258;

/// Size of the configuration record on the wire.
pub const CONFIG_SIZE: usize = 28;

/// fw_cfg file name carrying the ramfb configuration.
pub const RAMFB_FILE: &str = "etc/ramfb";

/// Serialize the configuration record:
/// `{addr: u64, fourcc, flags, width, height, stride: u32}`, big-endian.
pub fn encode_config(addr: u64, width: u32, height: u32) -> [u8; CONFIG_SIZE] {
    let stride = width * 4;
    let mut bytes = [0u8; CONFIG_SIZE];
    bytes[0..8].copy_from_slice(&addr.to_be_bytes());
    bytes[8..12].copy_from_slice(&FOURCC_XR24.to_be_bytes());
    bytes[12..16].copy_from_slice(&0u32.to_be_bytes());
    bytes[16..20].copy_from_slice(&width.to_be_bytes());
    bytes[20..24].copy_from_slice(&height.to_be_bytes());
    bytes[24..28].copy_from_slice(&stride.to_be_bytes());
    bytes
}

/// Decoded configuration record (used to verify the wire layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamfbConfig {
    pub addr: u64,
    pub fourcc: u32,
    pub flags: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

/// Deserialize a configuration record.
pub fn parse_config(bytes: &[u8; CONFIG_SIZE]) -> RamfbConfig {
    let field32 = |offset: usize| {
        u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    };
    RamfbConfig {
        addr: u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]),
        fourcc: field32(8),
        flags: field32(12),
        width: field32(16),
        height: field32(20),
        stride: field32(24),
    }
}

/// Bring up the display at the given geometry.
///
/// Probes fw_cfg DMA support, locates the `etc/ramfb` selector, backs the
/// framebuffer with contiguous physical frames, and publishes it to QEMU.
/// Returns the live pixel surface.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub fn init(width: u32, height: u32) -> crate::error::KernelResult<crate::graphics::Framebuffer> {
    use crate::drivers::fw_cfg::with_fw_cfg;
    use crate::error::KernelError;
    use crate::graphics::Framebuffer;
    use crate::mm::{self, page};

    if !with_fw_cfg(|fw| fw.dma_supported()) {
        return Err(KernelError::NotInitialized {
            subsystem: "fw_cfg DMA",
        });
    }

    let selector = with_fw_cfg(|fw| fw.find_file(RAMFB_FILE))?;

    let stride = width * 4;
    let fb_size = stride as usize * height as usize;
    let frames = fb_size.div_ceil(mm::FRAME_SIZE);
    // Frames come back zeroed, so the display starts black.
    let base = page::alloc_frames(frames)?;

    // The record must stay put while QEMU reads it during the DMA write.
    #[repr(C, align(16))]
    struct ConfigRecord([u8; CONFIG_SIZE]);
    let record = ConfigRecord(encode_config(base.as_u64(), width, height));

    with_fw_cfg(|fw| fw.dma_write(selector, &record.0))?;

    log::info!(
        "ramfb: {}x{} XRGB8888 at {:#x} ({} KiB)",
        width,
        height,
        base.as_u64(),
        fb_size / 1024
    );

    // SAFETY: the span was just allocated for this framebuffer, is
    // identity-mapped, and stays owned by the display for the kernel's
    // lifetime.
    Ok(unsafe { Framebuffer::new(base.as_usize() as *mut u8, width, height, stride) })
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn record_layout_is_big_endian() {
        let bytes = encode_config(0x4123_0000, 640, 480);

        assert_eq!(
            &bytes[0..8],
            &[0x00, 0x00, 0x00, 0x00, 0x41, 0x23, 0x00, 0x00]
        );
        // fourcc 'XR24' = 0x34325258 big-endian.
        assert_eq!(&bytes[8..12], &[0x34, 0x32, 0x52, 0x58]);
        // flags zero.
        assert_eq!(&bytes[12..16], &[0; 4]);
        // width 640 = 0x280.
        assert_eq!(&bytes[16..20], &[0x00, 0x00, 0x02, 0x80]);
        // height 480 = 0x1E0.
        assert_eq!(&bytes[20..24], &[0x00, 0x00, 0x01, 0xE0]);
        // stride = width * 4 = 2560 = 0xA00.
        assert_eq!(&bytes[24..28], &[0x00, 0x00, 0x0A, 0x00]);
    }

    #[test]
    fn record_roundtrip() {
        let bytes = encode_config(0x4000_1000, 1024, 768);
        let config = parse_config(&bytes);
        assert_eq!(
            config,
            RamfbConfig {
                addr: 0x4000_1000,
                fourcc: FOURCC_XR24,
                flags: 0,
                width: 1024,
                height: 768,
                stride: 4096,
            }
        );
    }
}
