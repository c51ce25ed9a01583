//! Error types surfaced by the engine's fallible constructors and the snapshot codec. Nothing
//! inside the step loop can fail once a [`crate::Nes`] exists.

/// Reasons a ROM image could not be turned into a cartridge.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum LoadError {
    #[display("ROM image is {len} bytes, shorter than the 16 byte header")]
    TooShort { len: usize },
    #[display("ROM image does not start with the iNES magic")]
    BadMagic,
    #[display("ROM image is truncated: header declares {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[display("ROM image declares more data than can be addressed")]
    TooLarge,
    #[display("ROM image declares no program ROM")]
    EmptyPrgRom,
    #[display("mapper {number} is not supported")]
    UnsupportedMapper { number: u16 },
}

/// Reasons a machine state could not be written to or read back from a snapshot slot.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum SnapshotError {
    #[display("snapshot codec failure: {source}")]
    Codec { source: postcard::Error },
    #[display("snapshot was taken from a cartridge with a different memory layout")]
    LayoutMismatch,
    #[display("snapshot slot ended {missing} bytes early")]
    Truncated { missing: usize },
}

impl From<postcard::Error> for SnapshotError {
    fn from(source: postcard::Error) -> Self {
        Self::Codec { source }
    }
}
