//! Error types for panotile-bitstream

/// Result type alias using the bitstream error type.
pub type Result<T> = std::result::Result<T, BitstreamError>;

/// Errors raised while framing, parsing, or rewriting a bitstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitstreamError {
    /// The stream does not begin with a start-code marker.
    #[error("Missing start code at byte {offset}")]
    MissingStartCode { offset: usize },

    /// A NAL unit is too short to hold its two-byte header.
    #[error("NAL unit at byte {offset} is {len} bytes, shorter than its header")]
    ShortNalUnit { offset: usize, len: usize },

    /// The forbidden_zero_bit of a NAL header is set.
    #[error("Forbidden bit set in NAL header at byte {offset}")]
    ForbiddenBit { offset: usize },

    /// An escape byte is not followed by a byte in `[0, 3]`.
    #[error("Inconsistent emulation prevention byte at {offset}")]
    EscapeSequence { offset: usize },

    /// The payload ended before a syntax element could be read.
    #[error("Truncated bitstream while reading {field}")]
    Truncated { field: &'static str },

    /// The NAL unit is not of the expected type.
    #[error("Unexpected NAL unit type {found}, expected {expected}")]
    UnexpectedNalType { expected: &'static str, found: u8 },

    /// A field rewrite needs more bits than the field occupies.
    #[error("Field {field} is {width} bits wide but the new value needs {required}")]
    FieldWidthOverflow {
        field: &'static str,
        width: usize,
        required: usize,
    },

    /// A field rewrite would change a width that later syntax depends on.
    #[error("Rewriting {field} from {width} to {required} bits would misalign the payload")]
    UnalignedRewrite {
        field: &'static str,
        width: usize,
        required: usize,
    },

    /// A value is outside the range allowed for the field.
    #[error("Value {value} is out of range for {field}")]
    InvalidFieldValue { field: &'static str, value: u32 },

    /// Composing replacement bits failed.
    #[error("Failed to write syntax elements: {0}")]
    Write(String),
}

impl From<std::io::Error> for BitstreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Write(err.to_string())
    }
}

impl BitstreamError {
    pub fn truncated(field: &'static str) -> Self {
        Self::Truncated { field }
    }

    pub fn overflow(field: &'static str, width: usize, required: usize) -> Self {
        Self::FieldWidthOverflow {
            field,
            width,
            required,
        }
    }

    /// True for the field-width rejection, as opposed to a parse failure.
    pub fn is_width_overflow(&self) -> bool {
        matches!(self, Self::FieldWidthOverflow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BitstreamError::overflow("pps_pic_parameter_set_id", 1, 3);
        assert_eq!(
            err.to_string(),
            "Field pps_pic_parameter_set_id is 1 bits wide but the new value needs 3"
        );
        assert!(err.is_width_overflow());

        let err = BitstreamError::truncated("tiles_enabled_flag");
        assert_eq!(
            err.to_string(),
            "Truncated bitstream while reading tiles_enabled_flag"
        );
        assert!(!err.is_width_overflow());
    }
}
