//! Record schema, source slot types, and per-field output encodings.
//!
//! A source record is a flat run of equally sized slots:
//!
//! ```text
//! | label | num_0 .. num_{N-1} | cat_0 .. cat_{K-1} |
//! ```
//!
//! Every slot is [`SLOT_BYTES`] wide. Numerical slots hold IEEE-754 `f32`
//! bit patterns stored through the integer view; label and categorical slots
//! hold integers of the record's [`SourceType`].

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width in bytes of every slot in a source record.
pub const SLOT_BYTES: usize = 4;

/// Column index of the label slot within a record.
pub const LABEL_COLUMN: usize = 0;

// ============================================================================
// Criteo 1TB schema table
// ============================================================================

/// Numerical field names of the Criteo 1TB click logs, in column order.
pub const CRITEO_NUMERICAL_NAMES: [&str; 13] = [
    "int_0", "int_1", "int_2", "int_3", "int_4", "int_5", "int_6", "int_7", "int_8", "int_9",
    "int_10", "int_11", "int_12",
];

/// Per-feature cardinality bounds of the 26 Criteo 1TB categorical features.
pub const CRITEO_CATEGORICAL_CARDINALITIES: [u64; 26] = [
    45_833_188, 36_746, 17_245, 7_413, 20_243, 3, 7_114, 1_441, 62, 29_275_261, 1_572_176,
    345_138, 10, 2_209, 11_267, 128, 4, 974, 14, 48_937_457, 11_316_796, 40_094_537, 452_104,
    12_606, 104, 35,
];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("categorical feature {feature} with cardinality {cardinality} is too big for any supported integer width")]
    CardinalityTooLarge { feature: usize, cardinality: u64 },

    #[error("unsupported source element type: {0}")]
    UnsupportedSourceType(String),
}

// ============================================================================
// Source slot type
// ============================================================================

/// Integer type of the label and categorical slots in the source file.
///
/// Both variants are [`SLOT_BYTES`] wide, so the record geometry does not
/// depend on which one is chosen; only the value conversion does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Int32,
    UInt32,
}

impl SourceType {
    /// Size of one source element in bytes.
    pub const fn width(self) -> usize {
        match self {
            SourceType::Int32 => std::mem::size_of::<i32>(),
            SourceType::UInt32 => std::mem::size_of::<u32>(),
        }
    }

    /// Convert a raw slot (native byte order) to its integer value.
    #[inline]
    pub fn decode(self, slot: [u8; SLOT_BYTES]) -> i64 {
        match self {
            SourceType::Int32 => i32::from_ne_bytes(slot) as i64,
            SourceType::UInt32 => u32::from_ne_bytes(slot) as i64,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SourceType::Int32 => "int32",
            SourceType::UInt32 => "uint32",
        }
    }
}

impl FromStr for SourceType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int32" => Ok(SourceType::Int32),
            "uint32" => Ok(SourceType::UInt32),
            other => Err(SchemaError::UnsupportedSourceType(other.to_string())),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Reinterpret a raw slot as an `f32` bit pattern. No numeric conversion
/// takes place: the integer `0x3FC0_0000` becomes `1.5`, not `1069547520.0`.
#[inline]
pub fn reinterpret_f32(slot: [u8; SLOT_BYTES]) -> f32 {
    f32::from_ne_bytes(slot)
}

// ============================================================================
// Categorical output width
// ============================================================================

/// Signed integer width used to store one categorical feature on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoricalWidth {
    Int8,
    Int16,
    Int32,
}

impl CategoricalWidth {
    /// Candidate widths, narrowest first.
    pub const ALL: [CategoricalWidth; 3] = [
        CategoricalWidth::Int8,
        CategoricalWidth::Int16,
        CategoricalWidth::Int32,
    ];

    /// Largest value representable at this width.
    pub const fn max_value(self) -> u64 {
        match self {
            CategoricalWidth::Int8 => i8::MAX as u64,
            CategoricalWidth::Int16 => i16::MAX as u64,
            CategoricalWidth::Int32 => i32::MAX as u64,
        }
    }

    /// Bytes per stored value.
    pub const fn bytes(self) -> usize {
        match self {
            CategoricalWidth::Int8 => 1,
            CategoricalWidth::Int16 => 2,
            CategoricalWidth::Int32 => 4,
        }
    }

    /// Pick the narrowest width whose maximum strictly exceeds `cardinality`.
    ///
    /// `feature` only labels the error.
    pub fn select(feature: usize, cardinality: u64) -> Result<Self, SchemaError> {
        Self::ALL
            .into_iter()
            .find(|w| cardinality < w.max_value())
            .ok_or(SchemaError::CardinalityTooLarge {
                feature,
                cardinality,
            })
    }

    /// Narrow `value` to this width by two's-complement truncation and append
    /// its native-order bytes to `out`.
    #[inline]
    pub fn narrow_into(self, value: i64, out: &mut Vec<u8>) {
        match self {
            CategoricalWidth::Int8 => out.extend_from_slice(&(value as i8).to_ne_bytes()),
            CategoricalWidth::Int16 => out.extend_from_slice(&(value as i16).to_ne_bytes()),
            CategoricalWidth::Int32 => out.extend_from_slice(&(value as i32).to_ne_bytes()),
        }
    }

    /// Decode one stored value, sign-extended to `i32`.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than [`CategoricalWidth::bytes`].
    #[inline]
    pub fn decode(self, bytes: &[u8]) -> i32 {
        match self {
            CategoricalWidth::Int8 => i8::from_ne_bytes([bytes[0]]) as i32,
            CategoricalWidth::Int16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as i32,
            CategoricalWidth::Int32 => i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

impl fmt::Display for CategoricalWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CategoricalWidth::Int8 => "int8",
            CategoricalWidth::Int16 => "int16",
            CategoricalWidth::Int32 => "int32",
        };
        f.pad(name)
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Field layout of one dataset, shared by all of its partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Numerical field names, in column order.
    pub numerical: Vec<String>,
    /// Cardinality bound per categorical feature, in column order.
    pub categorical_cardinalities: Vec<u64>,
}

impl Schema {
    pub fn new<S: Into<String>>(
        numerical: impl IntoIterator<Item = S>,
        categorical_cardinalities: Vec<u64>,
    ) -> Self {
        Self {
            numerical: numerical.into_iter().map(Into::into).collect(),
            categorical_cardinalities,
        }
    }

    /// The Criteo 1TB click-log schema: 13 numerical and 26 categorical fields.
    pub fn criteo() -> Self {
        Self::new(
            CRITEO_NUMERICAL_NAMES,
            CRITEO_CATEGORICAL_CARDINALITIES.to_vec(),
        )
    }

    pub fn num_numerical(&self) -> usize {
        self.numerical.len()
    }

    pub fn num_categorical(&self) -> usize {
        self.categorical_cardinalities.len()
    }

    /// Select the output width of every categorical feature.
    ///
    /// Fails on the first feature whose bound fits no supported width.
    pub fn categorical_widths(&self) -> Result<Vec<CategoricalWidth>, SchemaError> {
        self.categorical_cardinalities
            .iter()
            .enumerate()
            .map(|(feature, &cardinality)| CategoricalWidth::select(feature, cardinality))
            .collect()
    }

    pub fn layout(&self, source_type: SourceType) -> RecordLayout {
        RecordLayout {
            num_numerical: self.num_numerical(),
            num_categorical: self.num_categorical(),
            bytes_per_element: source_type.width(),
        }
    }
}

// ============================================================================
// Record geometry
// ============================================================================

/// Byte geometry of one source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub num_numerical: usize,
    pub num_categorical: usize,
    pub bytes_per_element: usize,
}

impl RecordLayout {
    /// Slots per record: label + numerical + categorical.
    pub const fn record_width(&self) -> usize {
        1 + self.num_numerical + self.num_categorical
    }

    pub const fn bytes_per_record(&self) -> usize {
        self.record_width() * self.bytes_per_element
    }

    /// Columns holding numerical slots.
    pub const fn numerical_columns(&self) -> Range<usize> {
        1..1 + self.num_numerical
    }

    /// Column holding categorical feature `feature`.
    pub const fn categorical_column(&self, feature: usize) -> usize {
        1 + self.num_numerical + feature
    }

    /// Whole records contained in a file of `file_len` bytes.
    pub fn num_records(&self, file_len: u64) -> u64 {
        file_len / self.bytes_per_record() as u64
    }

    /// Trailing bytes that do not form a whole record. These are never read.
    pub fn tail_bytes(&self, file_len: u64) -> u64 {
        file_len % self.bytes_per_record() as u64
    }

    /// Batches of `batch_size` records needed to cover a file of `file_len`
    /// bytes; the last one may be short.
    pub fn num_batches(&self, file_len: u64, batch_size: NonZeroUsize) -> u64 {
        self.num_records(file_len).div_ceil(batch_size.get() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_selection_examples() {
        assert_eq!(CategoricalWidth::select(0, 100), Ok(CategoricalWidth::Int8));
        assert_eq!(CategoricalWidth::select(0, 30_000), Ok(CategoricalWidth::Int16));
        assert_eq!(
            CategoricalWidth::select(0, 3_000_000),
            Ok(CategoricalWidth::Int32)
        );
    }

    #[test]
    fn test_width_selection_is_strict_at_the_boundary() {
        // The bound must be strictly below the width's maximum.
        assert_eq!(CategoricalWidth::select(0, 126), Ok(CategoricalWidth::Int8));
        assert_eq!(CategoricalWidth::select(0, 127), Ok(CategoricalWidth::Int16));
        assert_eq!(
            CategoricalWidth::select(0, 32_767),
            Ok(CategoricalWidth::Int32)
        );
        assert_eq!(
            CategoricalWidth::select(4, i32::MAX as u64),
            Err(SchemaError::CardinalityTooLarge {
                feature: 4,
                cardinality: i32::MAX as u64
            })
        );
    }

    #[test]
    fn test_width_selection_rejects_oversized_bound() {
        let err = CategoricalWidth::select(7, 5_000_000_000).unwrap_err();
        assert_eq!(
            err,
            SchemaError::CardinalityTooLarge {
                feature: 7,
                cardinality: 5_000_000_000
            }
        );
    }

    #[test]
    fn test_categorical_widths_reports_first_bad_feature() {
        let schema = Schema::new(["a"], vec![10, u64::MAX, 20, u64::MAX]);
        assert_eq!(
            schema.categorical_widths(),
            Err(SchemaError::CardinalityTooLarge {
                feature: 1,
                cardinality: u64::MAX
            })
        );
    }

    #[test]
    fn test_criteo_schema() {
        let schema = Schema::criteo();
        assert_eq!(schema.num_numerical(), 13);
        assert_eq!(schema.num_categorical(), 26);

        let widths = schema.categorical_widths().unwrap();
        assert_eq!(widths[0], CategoricalWidth::Int32);
        assert_eq!(widths[5], CategoricalWidth::Int8);
        assert_eq!(widths[15], CategoricalWidth::Int16); // 128 is not below i8::MAX

        let layout = schema.layout(SourceType::Int32);
        assert_eq!(layout.record_width(), 40);
        assert_eq!(layout.bytes_per_record(), 160);
    }

    #[test]
    fn test_layout_arithmetic() {
        let layout = Schema::new(["x", "y"], vec![10, 100_000]).layout(SourceType::Int32);
        assert_eq!(layout.record_width(), 5);
        assert_eq!(layout.bytes_per_record(), 20);
        assert_eq!(layout.numerical_columns(), 1..3);
        assert_eq!(layout.categorical_column(0), 3);
        assert_eq!(layout.categorical_column(1), 4);

        let file_len = 20 * 7 + 13;
        assert_eq!(layout.num_records(file_len), 7);
        assert_eq!(layout.tail_bytes(file_len), 13);

        let three = NonZeroUsize::new(3).unwrap();
        assert_eq!(layout.num_batches(file_len, three), 3);
        assert_eq!(layout.num_batches(20 * 6, three), 2);
        assert_eq!(layout.num_batches(19, three), 0);
    }

    #[test]
    fn test_source_type_parse_and_decode() {
        assert_eq!("int32".parse::<SourceType>(), Ok(SourceType::Int32));
        assert_eq!("UInt32".parse::<SourceType>(), Ok(SourceType::UInt32));
        assert_eq!(
            "float64".parse::<SourceType>(),
            Err(SchemaError::UnsupportedSourceType("float64".to_string()))
        );
        assert_eq!(SourceType::default(), SourceType::Int32);

        let slot = (-1i32).to_ne_bytes();
        assert_eq!(SourceType::Int32.decode(slot), -1);
        assert_eq!(SourceType::UInt32.decode(slot), u32::MAX as i64);
    }

    #[test]
    fn test_reinterpret_is_not_conversion() {
        let slot = 0x3FC0_0000u32.to_ne_bytes();
        assert_eq!(reinterpret_f32(slot), 1.5);
        assert_eq!(SourceType::Int32.decode(slot), 0x3FC0_0000);
    }

    #[test]
    fn test_narrow_truncates_and_decode_sign_extends() {
        let mut out = Vec::new();
        CategoricalWidth::Int8.narrow_into(300, &mut out);
        assert_eq!(out, vec![44]);
        assert_eq!(CategoricalWidth::Int8.decode(&out), 44);

        out.clear();
        CategoricalWidth::Int16.narrow_into(-2, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(CategoricalWidth::Int16.decode(&out), -2);

        out.clear();
        CategoricalWidth::Int32.narrow_into(70_000, &mut out);
        assert_eq!(CategoricalWidth::Int32.decode(&out), 70_000);
    }
}
