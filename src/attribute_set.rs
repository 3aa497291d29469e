use bitvec::prelude::*;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// A collection of bits describing device capabilities.
///
/// The force feedback bitmap reported by `EVIOCGBIT(EV_FF)` is viewed through this type, indexed
/// by [`FFEffectCode`](crate::FFEffectCode).
#[repr(transparent)]
pub struct AttributeSetRef<T> {
    _indexer: std::marker::PhantomData<T>,
    bitslice: BitSlice<u8>,
}

impl<T: EvdevEnum> AttributeSetRef<T> {
    #[inline]
    fn new(bitslice: &BitSlice<u8>) -> &Self {
        // SAFETY: for<T> AttributeSetRef<T> is repr(transparent) over BitSlice<u8>
        unsafe { &*(bitslice as *const BitSlice<u8> as *const Self) }
    }

    #[inline]
    fn new_mut(bitslice: &mut BitSlice<u8>) -> &mut Self {
        // SAFETY: for<T> AttributeSetRef<T> is repr(transparent) over BitSlice<u8>
        unsafe { &mut *(bitslice as *mut BitSlice<u8> as *mut Self) }
    }

    /// Views a raw kernel bitmap, such as the buffer a caller handed to `EVIOCGBIT`.
    #[inline]
    pub fn from_raw(bytes: &[u8]) -> &Self {
        Self::new(BitSlice::from_slice(bytes))
    }

    /// Mutable counterpart of [`from_raw`](Self::from_raw).
    #[inline]
    pub fn from_raw_mut(bytes: &mut [u8]) -> &mut Self {
        Self::new_mut(BitSlice::from_slice_mut(bytes))
    }

    /// Returns `true` if this set contains the passed T.
    #[inline]
    pub fn contains(&self, attr: T) -> bool {
        self.bitslice.get(attr.to_index()).map_or(false, |b| *b)
    }

    /// Provides an iterator over all "set" bits in the collection.
    #[inline]
    pub fn iter(&self) -> AttributeSetRefIter<'_, T> {
        self.into_iter()
    }

    pub fn insert(&mut self, attr: T) {
        self.set(attr, true)
    }

    pub fn remove(&mut self, attr: T) {
        self.set(attr, false)
    }

    /// Sets every bit, including the ones past the last named constant.
    pub fn fill(&mut self) {
        self.bitslice.fill(true)
    }

    #[inline]
    fn set(&mut self, attr: T, on: bool) {
        if let Some(mut bit) = self.bitslice.get_mut(attr.to_index()) {
            *bit = on;
        }
    }
}

impl<T: EvdevEnum + fmt::Debug> fmt::Debug for AttributeSetRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a, T: EvdevEnum> IntoIterator for &'a AttributeSetRef<T> {
    type Item = T;
    type IntoIter = AttributeSetRefIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        AttributeSetRefIter {
            _indexer: std::marker::PhantomData,
            inner: self.bitslice.iter_ones(),
        }
    }
}

pub struct AttributeSetRefIter<'a, T> {
    _indexer: std::marker::PhantomData<&'a T>,
    inner: bitvec::slice::IterOnes<'a, u8, Lsb0>,
}

impl<T: EvdevEnum> Iterator for AttributeSetRefIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(T::from_index)
    }
}

/// An owned, fixed-size capability set.
pub struct AttributeSet<T: ArrayedEvdevEnum> {
    container: T::Array,
}

impl<T: ArrayedEvdevEnum> AttributeSet<T> {
    pub fn new() -> Self {
        Self {
            container: T::zeroed_array(),
        }
    }

    fn as_bitslice(&self) -> &BitSlice<u8> {
        T::array_as_slice(&self.container)
    }

    fn as_mut_bitslice(&mut self) -> &mut BitSlice<u8> {
        T::array_as_slice_mut(&mut self.container)
    }

    /// The backing bytes, sized for an `EVIOCGBIT` read.
    #[inline]
    pub fn as_mut_raw_slice(&mut self) -> &mut [u8] {
        T::array_as_buf(&mut self.container)
    }
}

impl<T: ArrayedEvdevEnum> Default for AttributeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ArrayedEvdevEnum> FromIterator<T> for AttributeSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = AttributeSet::default();
        iter.into_iter().for_each(|el| set.insert(el));
        set
    }
}

impl<T: ArrayedEvdevEnum> Deref for AttributeSet<T> {
    type Target = AttributeSetRef<T>;
    fn deref(&self) -> &AttributeSetRef<T> {
        AttributeSetRef::new(self.as_bitslice())
    }
}

impl<T: ArrayedEvdevEnum> DerefMut for AttributeSet<T> {
    fn deref_mut(&mut self) -> &mut AttributeSetRef<T> {
        AttributeSetRef::new_mut(self.as_mut_bitslice())
    }
}

impl<'a, T: ArrayedEvdevEnum> IntoIterator for &'a AttributeSet<T> {
    type Item = T;
    type IntoIter = AttributeSetRefIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        (**self).into_iter()
    }
}

impl<T: ArrayedEvdevEnum + fmt::Debug> fmt::Debug for AttributeSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (**self).fmt(f)
    }
}

pub trait EvdevEnum: Copy + 'static {
    fn from_index(i: usize) -> Self;
    fn to_index(self) -> usize;
}

pub trait ArrayedEvdevEnum: EvdevEnum {
    type Array;
    fn array_as_slice(arr: &Self::Array) -> &BitSlice<u8>;
    fn array_as_slice_mut(arr: &mut Self::Array) -> &mut BitSlice<u8>;
    fn array_as_buf(arr: &mut Self::Array) -> &mut [u8];
    fn zeroed_array() -> Self::Array;
}

macro_rules! evdev_enum {
    ($t:ty, Array, $($(#[$attr:meta])* $c:ident = $val:expr,)*) => {
        impl $crate::attribute_set::ArrayedEvdevEnum for $t {
            type Array = bitvec::BitArr!(for <$t>::COUNT, in u8);
            fn array_as_slice(arr: &Self::Array) -> &bitvec::slice::BitSlice<u8> {
                arr
            }
            fn array_as_slice_mut(arr: &mut Self::Array) -> &mut bitvec::slice::BitSlice<u8> {
                arr
            }
            fn array_as_buf(arr: &mut Self::Array) -> &mut [u8] {
                bitvec::array::BitArray::as_raw_mut_slice(arr)
            }
            fn zeroed_array() -> Self::Array {
                bitvec::array::BitArray::ZERO
            }
        }
        evdev_enum!($t, $($(#[$attr])* $c = $val,)*);
    };
    ($t:ty, $($(#[$attr:meta])* $c:ident = $val:expr,)*) => {
        impl $t {
            $($(#[$attr])* pub const $c: Self = Self($val);)*

            const NAME_MAP: &'static [(&'static str, $t)] = &[
                $((stringify!($c), Self::$c),)*
            ];

            /// The kernel header name of this code, if it has one.
            pub fn name(self) -> Option<&'static str> {
                Self::NAME_MAP.iter().find(|e| e.1 == self).map(|e| e.0)
            }
        }
        impl std::str::FromStr for $t {
            type Err = crate::EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match Self::NAME_MAP.iter().find(|e| e.0 == s) {
                    Some(e) => Ok(e.1),
                    None => Err(crate::EnumParseError(())),
                }
            }
        }
        impl std::fmt::Debug for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                match self.name() {
                    Some(name) => f.pad(name),
                    None => write!(f, "unknown key: {}", self.0),
                }
            }
        }
        impl $crate::attribute_set::EvdevEnum for $t {
            #[inline]
            fn from_index(i: usize) -> Self {
                Self(i as _)
            }
            #[inline]
            fn to_index(self) -> usize {
                self.0 as _
            }
        }
        #[cfg(feature = "serde")]
        impl serde::Serialize for $t {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::ser::Serializer,
            {
                match self.name() {
                    Some(name) => serializer.serialize_str(name),
                    None => serializer.serialize_u16(self.0),
                }
            }
        }
        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::de::Deserializer<'de>,
            {
                struct Visitor;
                impl<'de> serde::de::Visitor<'de> for Visitor {
                    type Value = $t;

                    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                        write!(formatter, "a string with any of the constants in {}", stringify!($t))
                    }

                    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        match <$t>::NAME_MAP.iter().find(|(key, _)| s.eq_ignore_ascii_case(key)) {
                            Some((_, v)) => Ok(*v),
                            None => Err(serde::de::Error::invalid_value(serde::de::Unexpected::Str(s), &self)),
                        }
                    }

                    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        u16::try_from(v)
                            .map(|code| <$t as $crate::attribute_set::EvdevEnum>::from_index(code as usize))
                            .map_err(|_| serde::de::Error::invalid_value(serde::de::Unexpected::Unsigned(v), &self))
                    }
                }
                deserializer.deserialize_any(Visitor)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{AttributeSet, AttributeSetRef, FFEffectCode};

    #[test]
    fn raw_bitmap_view() {
        let mut bytes = [0u8; 16];
        bytes[FFEffectCode::FF_CONSTANT.0 as usize / 8] |= 1 << (FFEffectCode::FF_CONSTANT.0 % 8);
        bytes[FFEffectCode::FF_GAIN.0 as usize / 8] |= 1 << (FFEffectCode::FF_GAIN.0 % 8);

        let set = AttributeSetRef::<FFEffectCode>::from_raw(&bytes);
        assert!(set.contains(FFEffectCode::FF_CONSTANT));
        assert!(set.contains(FFEffectCode::FF_GAIN));
        assert!(!set.contains(FFEffectCode::FF_RUMBLE));
        assert_eq!(
            vec![FFEffectCode::FF_CONSTANT, FFEffectCode::FF_GAIN],
            set.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn fill_sets_every_bit() {
        let mut bytes = [0u8; 4];
        AttributeSetRef::<FFEffectCode>::from_raw_mut(&mut bytes).fill();
        assert_eq!([0xff; 4], bytes);
    }

    #[test]
    fn out_of_range_insert_is_ignored() {
        let mut bytes = [0u8; 1];
        let set = AttributeSetRef::<FFEffectCode>::from_raw_mut(&mut bytes);
        set.insert(FFEffectCode::FF_RUMBLE);
        assert_eq!(0, set.iter().count());
    }

    #[test]
    fn owned_set_collects() {
        let set: AttributeSet<FFEffectCode> =
            [FFEffectCode::FF_RUMBLE, FFEffectCode::FF_PERIODIC].into_iter().collect();
        assert_eq!(2, set.iter().count());
        assert!(set.contains(FFEffectCode::FF_PERIODIC));
    }
}
