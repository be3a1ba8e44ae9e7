use std::fmt;

// DType — float element types
//
// Every opcode is floating-point math, so engines accept f16, bf16, f32
// and f64. Half types compute through `num_traits::Float`, which widens to
// f32 per operation. Host and grid run the same code for every type.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
}

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A float type the engines can transform.
///
/// Grid memory keeps elements as atomic 64-bit cells, so each element
/// round-trips through its raw bit pattern without loss (signed zeros and
/// NaN payloads included).
pub trait Element:
    num_traits::Float + Default + Send + Sync + 'static + fmt::Debug + fmt::Display
{
    const DTYPE: DType;

    /// Widen to f64. Not `to_f64`, which `ToPrimitive` already claims.
    fn as_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;

    /// Raw bit pattern, zero-extended.
    fn to_bits64(self) -> u64;

    fn from_bits64(bits: u64) -> Self;
}

macro_rules! impl_element {
    ($t:ty, $dtype:ident, $bits:ty, |$x:ident| $widen:expr, |$v:ident| $narrow:expr) => {
        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            fn as_f64(self) -> f64 {
                let $x = self;
                $widen
            }

            fn from_f64($v: f64) -> Self {
                $narrow
            }

            fn to_bits64(self) -> u64 {
                self.to_bits() as u64
            }

            fn from_bits64(bits: u64) -> Self {
                <$t>::from_bits(bits as $bits)
            }
        }
    };
}

impl_element!(f32, F32, u32, |x| x as f64, |v| v as f32);
impl_element!(f64, F64, u64, |x| x, |v| v);
impl_element!(half::f16, F16, u16, |x| x.to_f64(), |v| half::f16::from_f64(v));
impl_element!(half::bf16, BF16, u16, |x| x.to_f64(), |v| half::bf16::from_f64(v));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_table() {
        let names: Vec<String> = [DType::F16, DType::BF16, DType::F32, DType::F64]
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(names, ["f16", "bf16", "f32", "f64"]);
        assert_eq!(half::f16::DTYPE, DType::F16);
        assert_eq!(half::bf16::DTYPE, DType::BF16);
    }

    #[test]
    fn test_element_f32() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(<f32 as Element>::from_f64(3.14).as_f64(), 3.140000104904175);
    }

    #[test]
    fn test_bits_roundtrip_keeps_sign_and_nan() {
        let neg_zero = -0.0f32;
        assert_eq!(f32::from_bits64(neg_zero.to_bits64()).to_bits(), neg_zero.to_bits());
        let nan = f64::from_bits(0x7ff8_0000_0000_beef);
        assert_eq!(f64::from_bits64(nan.to_bits64()).to_bits(), nan.to_bits());
        let h = half::f16::from_f32(1.5);
        assert_eq!(half::f16::from_bits64(h.to_bits64()), h);
    }
}
