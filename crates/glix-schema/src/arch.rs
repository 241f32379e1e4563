/// CPU architecture of a glibc build or a target executable.
///
/// Canonical names follow the Debian port names for the two x86 targets and
/// the kernel names for the two ARM targets. Build pages label the ARM ports
/// `arm64` and `armhf`; [`Arch::build_label`] returns that spelling.
///
/// # Example
///
/// ```
/// use glix_schema::Arch;
///
/// let arch: Arch = "arm64".parse().unwrap();
/// assert_eq!(arch, Arch::Aarch64);
/// assert_eq!(arch.build_label(), "arm64");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit x86.
    Amd64,
    /// 32-bit x86.
    I386,
    /// 64-bit ARM.
    Aarch64,
    /// 32-bit ARM (hard float).
    Arm,
}

impl Arch {
    /// Every supported architecture.
    pub const ALL: [Self; 4] = [Self::Amd64, Self::I386, Self::Aarch64, Self::Arm];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::I386 => "i386",
            Self::Aarch64 => "aarch64",
            Self::Arm => "arm",
        }
    }

    /// Label used on per-architecture build pages.
    pub fn build_label(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::I386 => "i386",
            Self::Aarch64 => "arm64",
            Self::Arm => "armhf",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "amd64" | "x86_64" | "x86-64" => Ok(Self::Amd64),
            "i386" | "i686" | "x86" => Ok(Self::I386),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "arm" | "armhf" => Ok(Self::Arm),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("AMD64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("armhf".parse::<Arch>().unwrap(), Arch::Arm);
        assert!("riscv64".parse::<Arch>().is_err());
    }

    #[test]
    fn test_build_label_roundtrips() {
        for arch in Arch::ALL {
            assert_eq!(arch.build_label().parse::<Arch>().unwrap(), arch);
            assert_eq!(arch.as_str().parse::<Arch>().unwrap(), arch);
        }
    }
}
