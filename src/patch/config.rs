//! Patch applier configuration.

use strum::{Display, EnumIter};

/// Pointer width of the patched process, selects the jump stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum PointerWidth {
    /// 32-bit process: `push imm32; ret`
    #[strum(serialize = "x86")]
    Bits32,
    /// 64-bit process: `mov rax, imm64; jmp rax`
    #[strum(serialize = "x64")]
    Bits64,
}

impl PointerWidth {
    /// Width of the current process
    #[must_use]
    pub fn host() -> Self {
        if cfg!(target_pointer_width = "64") {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        }
    }

    /// Number of entry bytes a stub overwrites
    #[must_use]
    pub fn stub_len(self) -> usize {
        match self {
            PointerWidth::Bits32 => 6,
            PointerWidth::Bits64 => 12,
        }
    }
}

/// How entry points are patched.
///
/// # Examples
///
/// ```rust
/// use dothook::patch::{PatchConfig, PointerWidth};
///
/// let config = PatchConfig::x86().with_follow_jumps(false);
/// assert_eq!(config.pointer_width, PointerWidth::Bits32);
/// assert!(!config.follow_jumps);
/// assert!(config.disable_inlining);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchConfig {
    /// Stub flavor
    pub pointer_width: PointerWidth,
    /// Patch the target of a leading `jmp rel32` instead of the jump itself
    pub follow_jumps: bool,
    /// Ask the host to stop inlining the routine before it is patched
    pub disable_inlining: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        PatchConfig {
            pointer_width: PointerWidth::host(),
            follow_jumps: true,
            disable_inlining: true,
        }
    }
}

impl PatchConfig {
    /// 64-bit stubs
    #[must_use]
    pub fn x64() -> Self {
        PatchConfig {
            pointer_width: PointerWidth::Bits64,
            ..PatchConfig::default()
        }
    }

    /// 32-bit stubs
    #[must_use]
    pub fn x86() -> Self {
        PatchConfig {
            pointer_width: PointerWidth::Bits32,
            ..PatchConfig::default()
        }
    }

    /// Set whether leading jumps are followed
    #[must_use]
    pub fn with_follow_jumps(mut self, follow: bool) -> Self {
        self.follow_jumps = follow;
        self
    }

    /// Set whether inlining is disabled first
    #[must_use]
    pub fn with_disable_inlining(mut self, disable: bool) -> Self {
        self.disable_inlining = disable;
        self
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn stub_lengths() {
        let lengths: Vec<(String, usize)> = PointerWidth::iter()
            .map(|width| (width.to_string(), width.stub_len()))
            .collect();
        assert_eq!(
            lengths,
            vec![("x86".to_string(), 6), ("x64".to_string(), 12)]
        );
    }

    #[test]
    fn presets() {
        assert_eq!(PatchConfig::x64().pointer_width, PointerWidth::Bits64);
        assert_eq!(PatchConfig::default().pointer_width, PointerWidth::host());
        assert!(PatchConfig::default().follow_jumps);
        assert!(!PatchConfig::x64().with_disable_inlining(false).disable_inlining);
    }
}
