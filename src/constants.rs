use crate::compat::FF_CNT;

/// Event types, as found in the `type_` field of an `input_event`.
///
/// Only [`FORCEFEEDBACK`](Self::FORCEFEEDBACK) writes are ever intercepted; everything else
/// passes through.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventType(pub u16);

evdev_enum!(
    EventType,
    /// A bookkeeping event. Usually not important to applications.
    SYNCHRONIZATION = 0x00,
    /// A key changed state.
    KEY = 0x01,
    /// Movement on a relative axis.
    RELATIVE = 0x02,
    /// Movement on an absolute axis.
    ABSOLUTE = 0x03,
    MISC = 0x04,
    SWITCH = 0x05,
    LED = 0x11,
    SOUND = 0x12,
    REPEAT = 0x14,
    /// Force feedback control: gain, autocenter and play/stop of uploaded effects.
    FORCEFEEDBACK = 0x15,
    POWER = 0x16,
    /// A force feedback effect's state changed.
    FORCEFEEDBACKSTATUS = 0x17,
);

/// Force feedback effect types, waveforms and device controls.
///
/// These share one code space: the `type_` of an `ff_effect`, the `waveform` of a periodic effect
/// and the `code` of a force feedback `input_event` addressing gain or autocenter all come from
/// here. Codes below [`FF_MAX_EFFECTS`] in an `input_event` are effect ids instead.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FFEffectCode(pub u16);

evdev_enum!(
    FFEffectCode,
    Array,
    FF_RUMBLE = 0x50,
    FF_PERIODIC = 0x51,
    FF_CONSTANT = 0x52,
    FF_SPRING = 0x53,
    FF_FRICTION = 0x54,
    FF_DAMPER = 0x55,
    FF_INERTIA = 0x56,
    FF_RAMP = 0x57,
    FF_SQUARE = 0x58,
    FF_TRIANGLE = 0x59,
    FF_SINE = 0x5a,
    FF_SAW_UP = 0x5b,
    FF_SAW_DOWN = 0x5c,
    FF_CUSTOM = 0x5d,
    FF_GAIN = 0x60,
    FF_AUTOCENTER = 0x61,
);

impl FFEffectCode {
    pub(crate) const COUNT: usize = FF_CNT;
}

/// `input_event` codes below this value address uploaded effects (play/stop).
pub const FF_MAX_EFFECTS: u16 = FFEffectCode::FF_GAIN.0;
