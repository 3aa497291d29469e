use crate::compat::{
    ff_condition_effect, ff_constant_effect, ff_periodic_effect, ff_ramp_effect, ff_replay,
    ff_rumble_effect, ff_trigger,
};
use nix::sys::ioctl::ioctl_num_type;
use nix::{
    ioctl_read, ioctl_read_buf, ioctl_write_int, ioctl_write_ptr, request_code_read,
    request_code_write,
};

#[repr(C)]
#[derive(Clone, Copy)]
pub union ff_effect_union {
    pub constant: ff_constant_effect,
    pub ramp: ff_ramp_effect,
    pub periodic: ff_periodic_effect,
    pub condition: [ff_condition_effect; 2],
    pub rumble: ff_rumble_effect,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ff_effect {
    pub type_: u16,
    pub id: i16,
    pub direction: u16,
    pub trigger: ff_trigger,
    pub replay: ff_replay,
    pub u: ff_effect_union,
}

impl ff_effect {
    /// An all-zero descriptor; every member of the payload union is valid at zero.
    pub fn zeroed() -> Self {
        // SAFETY: plain integers plus one raw pointer, all of which accept the zero pattern
        unsafe { std::mem::zeroed() }
    }
}

ioctl_read!(eviocgeffects, b'E', 0x84, ::libc::c_int);
ioctl_write_int!(eviocrmff, b'E', 0x81);
ioctl_write_ptr!(eviocsff, b'E', 0x80, ff_effect);

macro_rules! eviocgbit_ioctl {
    ($mac:ident!($name:ident, $ev:ident, $ty:ty)) => {
        eviocgbit_ioctl!($mac!($name, $crate::EventType::$ev.0, $ty));
    };
    ($mac:ident!($name:ident, $ev:expr, $ty:ty)) => {
        $mac!($name, b'E', 0x20 + $ev, $ty);
    };
}

eviocgbit_ioctl!(ioctl_read_buf!(eviocgbit_ff, FORCEFEEDBACK, u8));

/// Bits of a request number that carry the argument size.
const SIZE_MASK: ioctl_num_type =
    request_code_read!(0, 0, usize::MAX) ^ request_code_read!(0, 0, 0);
/// Value of one unit in the size field.
const SIZE_UNIT: ioctl_num_type = SIZE_MASK & SIZE_MASK.wrapping_neg();

/// A force feedback ioctl recognized by its direction, type and number.
///
/// The size field is ignored when matching, so callers compiled against a different struct
/// layout or passing an arbitrary `EVIOCGBIT` buffer length are still recognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// `EVIOCSFF`: upload a new effect or update an existing one.
    UploadEffect,
    /// `EVIOCRMFF`: erase an effect from device memory.
    RemoveEffect,
    /// `EVIOCGBIT(EV_FF, len)`: read the force feedback capability bitmap.
    QueryFeatures { len: usize },
    /// `EVIOCGEFFECTS`: number of effects the device can hold at once.
    QuerySlots,
}

impl Request {
    pub fn decode(request: ioctl_num_type) -> Option<Request> {
        let code = request & !SIZE_MASK;
        let is = |expected: ioctl_num_type| expected & !SIZE_MASK == code;

        if is(request_code_write!(b'E', 0x80, std::mem::size_of::<ff_effect>())) {
            Some(Request::UploadEffect)
        } else if is(request_code_write!(b'E', 0x81, std::mem::size_of::<libc::c_int>())) {
            Some(Request::RemoveEffect)
        } else if is(request_code_read!(
            b'E',
            0x20 + crate::EventType::FORCEFEEDBACK.0,
            0
        )) {
            let len = (request & SIZE_MASK) / SIZE_UNIT;
            Some(Request::QueryFeatures { len: len as usize })
        } else if is(request_code_read!(b'E', 0x84, std::mem::size_of::<libc::c_int>())) {
            Some(Request::QuerySlots)
        } else {
            None
        }
    }

    /// The request number a well-behaved caller would pass for this operation.
    pub fn encode(self) -> ioctl_num_type {
        match self {
            Request::UploadEffect => {
                request_code_write!(b'E', 0x80, std::mem::size_of::<ff_effect>())
            }
            Request::RemoveEffect => {
                request_code_write!(b'E', 0x81, std::mem::size_of::<libc::c_int>())
            }
            Request::QueryFeatures { len } => {
                request_code_read!(b'E', 0x20 + crate::EventType::FORCEFEEDBACK.0, len)
            }
            Request::QuerySlots => {
                request_code_read!(b'E', 0x84, std::mem::size_of::<libc::c_int>())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_known_requests() {
        for request in [
            Request::UploadEffect,
            Request::RemoveEffect,
            Request::QueryFeatures { len: 16 },
            Request::QuerySlots,
        ] {
            assert_eq!(Some(request), Request::decode(request.encode()));
        }
    }

    #[test]
    fn size_field_is_ignored() {
        let request = request_code_read!(b'E', 0x20 + 0x15, 3);
        assert_eq!(
            Some(Request::QueryFeatures { len: 3 }),
            Request::decode(request)
        );

        let upload = request_code_write!(b'E', 0x80, 12);
        assert_eq!(Some(Request::UploadEffect), Request::decode(upload));
    }

    #[test]
    fn unrelated_requests_pass() {
        // EVIOCGNAME and EVIOCGBIT(EV_KEY)
        assert_eq!(None, Request::decode(request_code_read!(b'E', 0x06, 256)));
        assert_eq!(None, Request::decode(request_code_read!(b'E', 0x21, 96)));
        // same number, other direction
        assert_eq!(None, Request::decode(request_code_read!(b'E', 0x80, 48)));
    }
}
