use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("not a Havok packfile: magic {found0:#010x} {found1:#010x}")]
    BadMagic { found0: u32, found1: u32 },

    #[error("unsupported Havok version string: {value:?}")]
    UnsupportedVersion { value: String },

    #[error("section index {index} out of range ({count} sections)")]
    SectionOutOfRange { index: u32, count: usize },

    #[error("fixup at source offset {address:#x} resolves to address zero")]
    DanglingFixup { address: u32 },

    #[error("virtual fixup references unknown class name offset {address:#x}")]
    ClassNameNotFound { address: u32 },

    #[error("missing required pointer for {context} at offset {offset:#x}")]
    MissingFixup { context: &'static str, offset: usize },

    #[error("invalid string at offset {offset:#x}: {message}")]
    InvalidString { offset: usize, message: String },

    #[error("count mismatch in {context}: expected {expected}, found {found}")]
    CountMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("bone {bone} has out-of-range parent {parent} ({count} bones)")]
    BoneParentOutOfRange { bone: usize, parent: i16, count: usize },

    #[error("bone {bone} is its own parent")]
    BoneSelfParent { bone: usize },

    #[error("unsupported rotation quantization {value} (only 40-bit three-component rotations are implemented)")]
    UnsupportedRotationQuantization { value: u8 },

    #[error("unsupported scalar quantization {value}")]
    UnsupportedScalarQuantization { value: u8 },

    #[error("spline-compressed scale channels are not implemented")]
    SplineScaleUnsupported,

    #[error("malformed knot vector: {message}")]
    MalformedKnots { message: String },

    #[error("no object decoded at address {address:#x}")]
    ObjectNotFound { address: u32 },

    #[error("object at address {address:#x} is a {found}, expected a {expected}")]
    ObjectKindMismatch {
        address: u32,
        expected: &'static str,
        found: &'static str,
    },

    #[error("file contains no animation container")]
    NoAnimationContainer,
}
