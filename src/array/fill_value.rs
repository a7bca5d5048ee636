//! Fill values.
//!
//! A [`FillValue`] is the byte representation of one array element.
//! It initialises every element of an array built with [`Array::new_full`](crate::array::Array::new_full).

/// The fill value of an array.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FillValue(Vec<u8>);

impl core::fmt::Display for FillValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<Vec<u8>> for FillValue {
    fn from(value: Vec<u8>) -> Self {
        FillValue(value)
    }
}

impl From<&[u8]> for FillValue {
    fn from(value: &[u8]) -> Self {
        FillValue(value.to_vec())
    }
}

impl From<bool> for FillValue {
    fn from(value: bool) -> Self {
        FillValue(vec![u8::from(value)])
    }
}

macro_rules! fill_value_from_ne_bytes {
    ( $($t:ty),* ) => {
        $(
            impl From<$t> for FillValue {
                fn from(value: $t) -> Self {
                    FillValue(value.to_ne_bytes().to_vec())
                }
            }
        )*
    };
}

fill_value_from_ne_bytes!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl FillValue {
    /// Create a new fill value composed of `bytes`.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> FillValue {
        FillValue(bytes)
    }

    /// Create a fill value from the native-endian bytes of a plain-old-data element.
    #[must_use]
    pub fn from_element<T: bytemuck::Pod>(element: T) -> FillValue {
        FillValue(bytemuck::bytes_of(&element).to_vec())
    }

    /// Create a zero-valued fill value of `size` bytes.
    #[must_use]
    pub fn zero(size: usize) -> FillValue {
        FillValue(vec![0; size])
    }

    /// Returns the size in bytes of the fill value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Return the byte representation of the fill value.
    #[must_use]
    pub fn as_ne_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check if `bytes` is composed entirely of repetitions of the fill value.
    ///
    /// Returns false if the length of `bytes` is not a multiple of the fill value size.
    #[must_use]
    pub fn equals_all(&self, bytes: &[u8]) -> bool {
        match self.0.len() {
            0 => bytes.is_empty(),
            1 => {
                let fill = self.0[0];
                bytes.iter().all(|&b| b == fill)
            }
            size => {
                bytes.len() % size == 0
                    && bytes.chunks_exact(size).all(|element| element == self.0)
            }
        }
    }

    /// Fill `bytes` with repetitions of the fill value.
    ///
    /// A trailing partial element is left untouched.
    pub(crate) fn repeat_into(&self, bytes: &mut [u8]) {
        match self.0.len() {
            0 => {}
            1 => bytes.fill(self.0[0]),
            size => bytes
                .chunks_exact_mut(size)
                .for_each(|element| element.copy_from_slice(&self.0)),
        }
    }
}

/// Return the first element of `bytes` if `bytes` consists of that element repeated.
pub(crate) fn repeated_element(bytes: &[u8], element_size: usize) -> Option<&[u8]> {
    if element_size == 0 || bytes.is_empty() || bytes.len() % element_size != 0 {
        return None;
    }
    let first = &bytes[..element_size];
    bytes
        .chunks_exact(element_size)
        .all(|element| element == first)
        .then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_value() {
        assert_eq!(FillValue::from(1u8).as_ne_bytes(), &[1]);
        assert_eq!(FillValue::from(1u32).size(), 4);
        assert_eq!(FillValue::from(-1i16).as_ne_bytes(), &[255, 255]);
        assert_eq!(
            FillValue::from_element(2.5f64).as_ne_bytes(),
            2.5f64.to_ne_bytes()
        );
        assert_eq!(FillValue::zero(3).as_ne_bytes(), &[0, 0, 0]);
        assert_eq!(FillValue::from(true).to_string(), "[1]");
    }

    #[test]
    fn fill_value_equals_all() {
        let fill_value = FillValue::from(7u16);
        let bytes: Vec<u8> = std::iter::repeat(7u16.to_ne_bytes())
            .take(5)
            .flatten()
            .collect();
        assert!(fill_value.equals_all(&bytes));
        assert!(!fill_value.equals_all(&bytes[1..]));
        let mut other = bytes.clone();
        other[4] = 0;
        assert!(!fill_value.equals_all(&other));
        assert!(FillValue::from(0u8).equals_all(&[0; 16]));
    }

    #[test]
    fn fill_value_repeat_into() {
        let fill_value = FillValue::from(0x0102u16);
        let mut bytes = vec![0u8; 6];
        fill_value.repeat_into(&mut bytes);
        assert!(fill_value.equals_all(&bytes));
    }

    #[test]
    fn fill_value_repeated_element() {
        assert_eq!(repeated_element(&[1, 2, 1, 2], 2), Some(&[1u8, 2][..]));
        assert_eq!(repeated_element(&[1, 2, 2, 1], 2), None);
        assert_eq!(repeated_element(&[1, 2, 1], 2), None);
        assert_eq!(repeated_element(&[], 2), None);
    }
}
