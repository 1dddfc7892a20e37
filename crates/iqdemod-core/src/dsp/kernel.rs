use serde::Deserialize;
use std::sync::OnceLock;

/// Implementation used for the inner loops of the IQ decimator and the AM
/// envelope detector.
///
/// Both kernels satisfy the same postcondition; `Vector` only changes how
/// many samples are processed per step. On targets without a vector path
/// `Vector` runs the scalar loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Scalar,
    Vector,
}

/// Configuration-level kernel selector.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KernelChoice {
    #[default]
    Auto,
    Scalar,
    Vector,
}

static VECTOR_SUPPORTED: OnceLock<bool> = OnceLock::new();

impl Kernel {
    /// Fastest kernel the running CPU supports. The probe runs once per process.
    pub fn detect() -> Self {
        if vector_supported() {
            Self::Vector
        } else {
            Self::Scalar
        }
    }

    pub fn from_choice(choice: KernelChoice) -> Self {
        match choice {
            KernelChoice::Auto => Self::detect(),
            KernelChoice::Scalar => Self::Scalar,
            KernelChoice::Vector => Self::Vector,
        }
    }

    /// True when this kernel will actually run vector code on this CPU.
    pub fn is_accelerated(self) -> bool {
        self == Self::Vector && vector_supported()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Vector => "vector",
        }
    }
}

impl KernelChoice {
    pub fn from_str_lower(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "scalar" => Some(Self::Scalar),
            "vector" | "simd" => Some(Self::Vector),
            _ => None,
        }
    }
}

pub fn vector_supported() -> bool {
    *VECTOR_SUPPORTED.get_or_init(probe_vector_support)
}

#[cfg(target_arch = "x86_64")]
fn probe_vector_support() -> bool {
    std::arch::is_x86_feature_detected!("sse2")
}

#[cfg(target_arch = "aarch64")]
fn probe_vector_support() -> bool {
    std::arch::is_aarch64_feature_detected!("neon")
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn probe_vector_support() -> bool {
    false
}

/// Name of the instruction set used by the vector kernel, for startup logs.
pub fn simd_description() -> &'static str {
    if !vector_supported() {
        return "none";
    }
    if cfg!(target_arch = "x86_64") {
        "SSE2"
    } else if cfg!(target_arch = "aarch64") {
        "NEON"
    } else {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_choices_are_respected() {
        assert_eq!(Kernel::from_choice(KernelChoice::Scalar), Kernel::Scalar);
        assert_eq!(Kernel::from_choice(KernelChoice::Vector), Kernel::Vector);
        assert_eq!(Kernel::from_choice(KernelChoice::Auto), Kernel::detect());
    }

    #[test]
    fn scalar_is_never_accelerated() {
        assert!(!Kernel::Scalar.is_accelerated());
    }

    #[test]
    fn kernel_choice_accepts_simd_alias() {
        assert_eq!(KernelChoice::from_str_lower("simd"), Some(KernelChoice::Vector));
        assert_eq!(KernelChoice::from_str_lower("fast"), None);
    }
}
