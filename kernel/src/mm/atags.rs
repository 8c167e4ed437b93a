//! ATAG boot-tag parsing.
//!
//! Legacy ARM boot firmware passes board information as a tag list ahead
//! of the kernel. QEMU virt does not provide one (the DTB carries the same
//! data), so the only consumer here is [`memory_size`], which falls back
//! to the platform constant when no list is present. The parser is
//! deliberately paranoid: firmware-provided structures are the least
//! trustworthy input the kernel reads.

/// `ATAG_NONE` terminates the list.
const ATAG_NONE: u32 = 0x0000_0000;
/// `ATAG_CORE` heads the list.
const ATAG_CORE: u32 = 0x5441_0001;
/// `ATAG_MEM` describes a memory bank: `{ size, start }`.
const ATAG_MEM: u32 = 0x5441_0002;

/// Upper bound on tags examined before giving up on a runaway list.
const MAX_TAGS: usize = 32;

/// Tag header sizes are in 32-bit words and must land in this range;
/// anything else is treated as corruption.
const MIN_TAG_WORDS: u32 = 2;
const MAX_TAG_WORDS: u32 = 32;

/// A memory bank reported by `ATAG_MEM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBank {
    pub size: u32,
    pub start: u32,
}

/// Extract the first `ATAG_MEM` bank from a tag list.
///
/// The caller provides the list as a word slice (on hardware, a bounded
/// window over the ATAG address). Returns `None` for an absent, malformed,
/// or `MEM`-less list; the caller then falls back to the platform default.
pub fn first_memory_bank(words: &[u32]) -> Option<MemoryBank> {
    let mut pos = 0usize;

    for _ in 0..MAX_TAGS {
        // A tag header is two words: size (in words, including the
        // header) and tag ID.
        let size_words = *words.get(pos)?;
        let tag = *words.get(pos + 1)?;

        if tag == ATAG_NONE {
            return None;
        }
        if !(MIN_TAG_WORDS..=MAX_TAG_WORDS).contains(&size_words) {
            // Corrupt size field; a zero here would also stall the walk.
            return None;
        }

        let next = pos.checked_add(size_words as usize)?;
        if next <= pos {
            return None;
        }

        if tag == ATAG_MEM {
            if size_words < 4 {
                return None;
            }
            return Some(MemoryBank {
                size: *words.get(pos + 2)?,
                start: *words.get(pos + 3)?,
            });
        }

        pos = next;
    }

    None
}

/// Total usable memory in bytes: the first `ATAG_MEM` bank when a list is
/// present, otherwise `fallback`.
pub fn memory_size(words: Option<&[u32]>, fallback: usize) -> usize {
    words
        .and_then(first_memory_bank)
        .map(|bank| bank.size as usize)
        .unwrap_or(fallback)
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn core_tag() -> std::vec::Vec<u32> {
        // ATAG_CORE: 5 words {size, tag, flags, pagesize, rootdev}
        std::vec![5, ATAG_CORE, 0, 0x1000, 0]
    }

    #[test]
    fn finds_first_mem_tag() {
        let mut list = core_tag();
        list.extend_from_slice(&[4, ATAG_MEM, 0x0800_0000, 0x4000_0000]);
        list.extend_from_slice(&[4, ATAG_MEM, 0x1000_0000, 0x8000_0000]);
        list.extend_from_slice(&[2, ATAG_NONE]);

        assert_eq!(
            first_memory_bank(&list),
            Some(MemoryBank {
                size: 0x0800_0000,
                start: 0x4000_0000,
            })
        );
        assert_eq!(memory_size(Some(&list), 1234), 0x0800_0000);
    }

    #[test]
    fn terminates_without_mem_tag() {
        let mut list = core_tag();
        list.extend_from_slice(&[2, ATAG_NONE]);
        assert_eq!(first_memory_bank(&list), None);
        assert_eq!(memory_size(Some(&list), 4096), 4096);
        assert_eq!(memory_size(None, 4096), 4096);
    }

    #[test]
    fn rejects_bad_tag_sizes() {
        // Size zero would stall the walk forever.
        let list = [0u32, ATAG_CORE, 4, ATAG_MEM, 64, 0];
        assert_eq!(first_memory_bank(&list), None);

        // Size beyond the sane bound.
        let list = [33u32, ATAG_CORE];
        assert_eq!(first_memory_bank(&list), None);
    }

    #[test]
    fn bounded_iteration_on_runaway_list() {
        // A long chain of minimal unknown tags with no terminator; the
        // walk must stop at the cap instead of running off the slice.
        let mut list = std::vec::Vec::new();
        for _ in 0..100 {
            list.extend_from_slice(&[2, 0x5441_00FF]);
        }
        assert_eq!(first_memory_bank(&list), None);
    }

    #[test]
    fn truncated_list_is_rejected() {
        // Header claims 4 words but the payload is cut short.
        let mut list = core_tag();
        list.extend_from_slice(&[4, ATAG_MEM, 0x0800_0000]);
        assert_eq!(first_memory_bank(&list), None);
    }
}
