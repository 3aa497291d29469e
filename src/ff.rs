use crate::compat::{ff_condition_effect, ff_envelope, ff_replay, ff_trigger};
use crate::constants::FFEffectCode;
use crate::{sys, Error};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Describes a generic force feedback effect envelope.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FFEnvelope {
    /// How long the attack should last in milliseconds.
    pub attack_length: u16,
    /// The level of the attack at the beginning of the attack.
    pub attack_level: u16,
    /// How long the fade should last in milliseconds.
    pub fade_length: u16,
    /// The level of the fade at the end of the fade.
    pub fade_level: u16,
}

impl From<ff_envelope> for FFEnvelope {
    fn from(value: ff_envelope) -> Self {
        Self {
            attack_length: value.attack_length,
            attack_level: value.attack_level,
            fade_length: value.fade_length,
            fade_level: value.fade_level,
        }
    }
}

impl From<FFEnvelope> for ff_envelope {
    fn from(value: FFEnvelope) -> Self {
        ff_envelope {
            attack_length: value.attack_length,
            attack_level: value.attack_level,
            fade_length: value.fade_length,
            fade_level: value.fade_level,
        }
    }
}

/// Describes the waveform for periodic force feedback effects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FFWaveform {
    /// Square waveform.
    Square,
    /// Triangle waveform.
    Triangle,
    /// Sine waveform.
    Sine,
    /// Sawtooth up waveform.
    SawUp,
    /// Sawtooth down waveform.
    SawDown,
    /// Driver-specific samples supplied by the caller through `custom_data`.
    Custom,
}

impl FFWaveform {
    pub const ALL: [FFWaveform; 6] = [
        Self::Square,
        Self::Triangle,
        Self::Sine,
        Self::SawUp,
        Self::SawDown,
        Self::Custom,
    ];

    pub fn code(self) -> FFEffectCode {
        match self {
            Self::Square => FFEffectCode::FF_SQUARE,
            Self::Triangle => FFEffectCode::FF_TRIANGLE,
            Self::Sine => FFEffectCode::FF_SINE,
            Self::SawUp => FFEffectCode::FF_SAW_UP,
            Self::SawDown => FFEffectCode::FF_SAW_DOWN,
            Self::Custom => FFEffectCode::FF_CUSTOM,
        }
    }

    pub fn from_code(code: FFEffectCode) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.code() == code)
    }

    /// Name used in trace files, e.g. `SAW_UP`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Square => "SQUARE",
            Self::Triangle => "TRIANGLE",
            Self::Sine => "SINE",
            Self::SawUp => "SAW_UP",
            Self::SawDown => "SAW_DOWN",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.name() == name)
    }
}

/// Describes one axis of a condition (spring, friction, damper or inertia) effect.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FFCondition {
    /// The maximum level when the joystick is moved all the way to the right.
    pub right_saturation: u16,
    /// The maximum level when the joystick is moved all the way to the left.
    pub left_saturation: u16,
    /// The coefficient that controls how fast the force grows when the joystick moves to the
    /// right.
    pub right_coefficient: i16,
    /// The coefficient that controls how fast the force grows when the joystick moves to the left.
    pub left_coefficient: i16,
    /// The size of the dead zone, which is the zone where no force is produced.
    pub deadband: u16,
    /// The position of the dead zone.
    pub center: i16,
}

impl From<ff_condition_effect> for FFCondition {
    fn from(value: ff_condition_effect) -> Self {
        Self {
            right_saturation: value.right_saturation,
            left_saturation: value.left_saturation,
            right_coefficient: value.right_coeff,
            left_coefficient: value.left_coeff,
            deadband: value.deadband,
            center: value.center,
        }
    }
}

impl From<FFCondition> for ff_condition_effect {
    fn from(value: FFCondition) -> Self {
        ff_condition_effect {
            right_saturation: value.right_saturation,
            left_saturation: value.left_saturation,
            right_coeff: value.right_coefficient,
            left_coeff: value.left_coefficient,
            deadband: value.deadband,
            center: value.center,
        }
    }
}

/// The type of a force feedback effect together with its parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FFEffectKind {
    Constant {
        /// The strength of the effect.
        level: i16,
        /// Envelope data.
        envelope: FFEnvelope,
    },
    Ramp {
        /// The strength at the beginning of the effect.
        start_level: i16,
        /// The strength at the end of the effect.
        end_level: i16,
        /// Envelope data.
        envelope: FFEnvelope,
    },
    Periodic {
        /// The kind of waveform to use for the force feedback effect.
        waveform: FFWaveform,
        /// The period of the wave in milliseconds.
        period: u16,
        /// The peak value or amplitude of the wave.
        magnitude: i16,
        /// The mean value of the wave (roughly).
        offset: i16,
        /// The horizontal shift.
        phase: u16,
        /// Envelope data.
        envelope: FFEnvelope,
    },
    Spring {
        /// Condition data for each axis.
        condition: [FFCondition; 2],
    },
    Friction {
        condition: [FFCondition; 2],
    },
    Damper {
        condition: [FFCondition; 2],
    },
    Inertia {
        condition: [FFCondition; 2],
    },
    Rumble {
        /// The magnitude of the heavy motor.
        strong_magnitude: u16,
        /// The magnitude of the light motor.
        weak_magnitude: u16,
    },
}

impl FFEffectKind {
    pub fn code(&self) -> FFEffectCode {
        match self {
            Self::Constant { .. } => FFEffectCode::FF_CONSTANT,
            Self::Ramp { .. } => FFEffectCode::FF_RAMP,
            Self::Periodic { .. } => FFEffectCode::FF_PERIODIC,
            Self::Spring { .. } => FFEffectCode::FF_SPRING,
            Self::Friction { .. } => FFEffectCode::FF_FRICTION,
            Self::Damper { .. } => FFEffectCode::FF_DAMPER,
            Self::Inertia { .. } => FFEffectCode::FF_INERTIA,
            Self::Rumble { .. } => FFEffectCode::FF_RUMBLE,
        }
    }

    /// Name used in trace files, e.g. `PERIODIC`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "CONSTANT",
            Self::Ramp { .. } => "RAMP",
            Self::Periodic { .. } => "PERIODIC",
            Self::Spring { .. } => "SPRING",
            Self::Friction { .. } => "FRICTION",
            Self::Damper { .. } => "DAMPER",
            Self::Inertia { .. } => "INERTIA",
            Self::Rumble { .. } => "RUMBLE",
        }
    }

    /// Parameters a freshly built effect of the named type starts from.
    ///
    /// Returns `None` for names that are not one of the eight effect types.
    pub fn initial(type_name: &str) -> Option<Self> {
        let envelope = FFEnvelope::default();
        let condition = [FFCondition {
            right_saturation: 0xffff,
            left_saturation: 0xffff,
            right_coefficient: 0x4000,
            left_coefficient: 0x4000,
            deadband: 0,
            center: 0,
        }; 2];

        let kind = match type_name {
            "CONSTANT" => Self::Constant {
                level: 0x6000,
                envelope,
            },
            "RAMP" => Self::Ramp {
                start_level: 0,
                end_level: 0x6000,
                envelope,
            },
            "PERIODIC" => Self::Periodic {
                waveform: FFWaveform::Sine,
                period: 1000,
                magnitude: 0x6000,
                offset: 0,
                phase: 0,
                envelope,
            },
            "SPRING" => Self::Spring { condition },
            "FRICTION" => Self::Friction { condition },
            "DAMPER" => Self::Damper { condition },
            "INERTIA" => Self::Inertia { condition },
            "RUMBLE" => Self::Rumble {
                strong_magnitude: 0x6000,
                weak_magnitude: 0x2000,
            },
            _ => return None,
        };
        Some(kind)
    }

    /// The per-axis conditions, for the four condition effect types.
    pub fn condition(&self) -> Option<&[FFCondition; 2]> {
        match self {
            Self::Spring { condition }
            | Self::Friction { condition }
            | Self::Damper { condition }
            | Self::Inertia { condition } => Some(condition),
            _ => None,
        }
    }

    pub fn condition_mut(&mut self) -> Option<&mut [FFCondition; 2]> {
        match self {
            Self::Spring { condition }
            | Self::Friction { condition }
            | Self::Damper { condition }
            | Self::Inertia { condition } => Some(condition),
            _ => None,
        }
    }
}

/// Trigger information for the force feedback effect.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FFTrigger {
    /// The button number that triggers the force feedback effect.
    pub button: u16,
    /// How long to wait before the force feedback effect can be triggered again in milliseconds.
    pub interval: u16,
}

impl From<ff_trigger> for FFTrigger {
    fn from(value: ff_trigger) -> Self {
        Self {
            button: value.button,
            interval: value.interval,
        }
    }
}

impl From<FFTrigger> for ff_trigger {
    fn from(value: FFTrigger) -> Self {
        ff_trigger {
            button: value.button,
            interval: value.interval,
        }
    }
}

/// Scheduling information for the force feedback effect.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FFReplay {
    /// How long the force feedback effect should last in milliseconds.
    pub length: u16,
    /// How long to wait before the force feedback effect should play in milliseconds.
    pub delay: u16,
}

impl From<ff_replay> for FFReplay {
    fn from(value: ff_replay) -> Self {
        Self {
            length: value.length,
            delay: value.delay,
        }
    }
}

impl From<FFReplay> for ff_replay {
    fn from(value: FFReplay) -> Self {
        ff_replay {
            length: value.length,
            delay: value.delay,
        }
    }
}

/// A typed view of one `ff_effect`, as uploaded with `EVIOCSFF`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FFEffectDescriptor {
    /// Slot id, or `-1` to let the driver allocate one.
    pub id: i16,
    /// The direction of the force feedback effect.
    pub direction: u16,
    /// Trigger conditions.
    pub trigger: FFTrigger,
    /// Scheduling of the effect.
    pub replay: FFReplay,
    /// The type of force feedback effect and any associated parameters.
    pub kind: FFEffectKind,
}

impl FFEffectDescriptor {
    /// Direction of a freshly built effect: a quarter turn short of a full circle.
    pub const INITIAL_DIRECTION: u16 = 0xC000;

    /// An unassigned effect of the given kind with default timing.
    pub fn new(kind: FFEffectKind) -> Self {
        Self {
            id: -1,
            direction: Self::INITIAL_DIRECTION,
            trigger: FFTrigger::default(),
            replay: FFReplay::default(),
            kind,
        }
    }

    /// Writes every field back into `effect`.
    ///
    /// Parts of the raw descriptor without a typed counterpart, like the custom waveform samples
    /// of a periodic effect, are left untouched.
    pub fn apply_to(&self, effect: &mut sys::ff_effect) {
        effect.type_ = self.kind.code().0;
        effect.id = self.id;
        effect.direction = self.direction;
        effect.trigger = self.trigger.into();
        effect.replay = self.replay.into();

        match self.kind {
            FFEffectKind::Constant { level, envelope } => {
                effect.u.constant.level = level;
                effect.u.constant.envelope = envelope.into();
            }
            FFEffectKind::Ramp {
                start_level,
                end_level,
                envelope,
            } => {
                effect.u.ramp.start_level = start_level;
                effect.u.ramp.end_level = end_level;
                effect.u.ramp.envelope = envelope.into();
            }
            FFEffectKind::Periodic {
                waveform,
                period,
                magnitude,
                offset,
                phase,
                envelope,
            } => {
                effect.u.periodic.waveform = waveform.code().0;
                effect.u.periodic.period = period;
                effect.u.periodic.magnitude = magnitude;
                effect.u.periodic.offset = offset;
                effect.u.periodic.phase = phase;
                effect.u.periodic.envelope = envelope.into();
            }
            FFEffectKind::Spring { condition }
            | FFEffectKind::Friction { condition }
            | FFEffectKind::Damper { condition }
            | FFEffectKind::Inertia { condition } => {
                effect.u.condition = [condition[0].into(), condition[1].into()];
            }
            FFEffectKind::Rumble {
                strong_magnitude,
                weak_magnitude,
            } => {
                effect.u.rumble.strong_magnitude = strong_magnitude;
                effect.u.rumble.weak_magnitude = weak_magnitude;
            }
        }
    }
}

impl TryFrom<&sys::ff_effect> for FFEffectDescriptor {
    type Error = Error;

    fn try_from(value: &sys::ff_effect) -> Result<Self, Self::Error> {
        // SAFETY: each arm reads only the union member selected by `type_`
        let kind = match FFEffectCode(value.type_) {
            FFEffectCode::FF_CONSTANT => {
                let constant = unsafe { value.u.constant };

                FFEffectKind::Constant {
                    level: constant.level,
                    envelope: constant.envelope.into(),
                }
            }
            FFEffectCode::FF_RAMP => {
                let ramp = unsafe { value.u.ramp };

                FFEffectKind::Ramp {
                    start_level: ramp.start_level,
                    end_level: ramp.end_level,
                    envelope: ramp.envelope.into(),
                }
            }
            FFEffectCode::FF_PERIODIC => {
                let periodic = unsafe { value.u.periodic };

                FFEffectKind::Periodic {
                    waveform: FFWaveform::from_code(FFEffectCode(periodic.waveform))
                        .ok_or(Error::UnknownWaveform(periodic.waveform))?,
                    period: periodic.period,
                    magnitude: periodic.magnitude,
                    offset: periodic.offset,
                    phase: periodic.phase,
                    envelope: periodic.envelope.into(),
                }
            }
            code @ (FFEffectCode::FF_SPRING
            | FFEffectCode::FF_FRICTION
            | FFEffectCode::FF_DAMPER
            | FFEffectCode::FF_INERTIA) => {
                let raw = unsafe { value.u.condition };
                let condition = [raw[0].into(), raw[1].into()];

                match code {
                    FFEffectCode::FF_SPRING => FFEffectKind::Spring { condition },
                    FFEffectCode::FF_FRICTION => FFEffectKind::Friction { condition },
                    FFEffectCode::FF_DAMPER => FFEffectKind::Damper { condition },
                    _ => FFEffectKind::Inertia { condition },
                }
            }
            FFEffectCode::FF_RUMBLE => {
                let rumble = unsafe { value.u.rumble };

                FFEffectKind::Rumble {
                    strong_magnitude: rumble.strong_magnitude,
                    weak_magnitude: rumble.weak_magnitude,
                }
            }
            _ => return Err(Error::UnknownEffectType(value.type_)),
        };

        Ok(Self {
            id: value.id,
            direction: value.direction,
            trigger: value.trigger.into(),
            replay: value.replay.into(),
            kind,
        })
    }
}

impl From<FFEffectDescriptor> for sys::ff_effect {
    fn from(value: FFEffectDescriptor) -> Self {
        let mut effect = sys::ff_effect::zeroed();
        value.apply_to(&mut effect);
        effect
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn periodic() -> FFEffectDescriptor {
        FFEffectDescriptor {
            id: 3,
            direction: 0x4000,
            trigger: FFTrigger {
                button: 1,
                interval: 20,
            },
            replay: FFReplay {
                length: 500,
                delay: 10,
            },
            kind: FFEffectKind::Periodic {
                waveform: FFWaveform::SawDown,
                period: 250,
                magnitude: -1200,
                offset: 300,
                phase: 9000,
                envelope: FFEnvelope {
                    attack_length: 1,
                    attack_level: 2,
                    fade_length: 3,
                    fade_level: 4,
                },
            },
        }
    }

    #[test]
    fn raw_conversion_keeps_fields() {
        let descriptor = periodic();
        let raw: sys::ff_effect = descriptor.into();
        assert_eq!(FFEffectCode::FF_PERIODIC.0, raw.type_);
        assert_eq!(3, raw.id);
        assert_eq!(descriptor, FFEffectDescriptor::try_from(&raw).unwrap());
    }

    #[test]
    fn condition_axes_survive() {
        let mut condition = FFEffectKind::initial("DAMPER").unwrap();
        condition.condition_mut().unwrap()[1].center = -77;
        let raw: sys::ff_effect = FFEffectDescriptor::new(condition).into();
        let back = FFEffectDescriptor::try_from(&raw).unwrap();
        assert_eq!(FFEffectCode::FF_DAMPER, back.kind.code());
        assert_eq!(-77, back.kind.condition().unwrap()[1].center);
    }

    #[test]
    fn apply_keeps_custom_samples() {
        let mut samples = [1i16, 2, 3];
        let mut raw: sys::ff_effect = periodic().into();
        raw.u.periodic.custom_len = samples.len() as u32;
        raw.u.periodic.custom_data = samples.as_mut_ptr();

        let mut descriptor = FFEffectDescriptor::try_from(&raw).unwrap();
        descriptor.direction = 0;
        descriptor.apply_to(&mut raw);

        assert_eq!(0, raw.direction);
        let periodic = unsafe { raw.u.periodic };
        assert_eq!(3, periodic.custom_len);
        assert_eq!(samples.as_mut_ptr(), periodic.custom_data);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut raw = sys::ff_effect::zeroed();
        raw.type_ = 0x42;
        assert!(matches!(
            FFEffectDescriptor::try_from(&raw),
            Err(Error::UnknownEffectType(0x42))
        ));

        raw.type_ = FFEffectCode::FF_PERIODIC.0;
        raw.u.periodic.waveform = 0x99;
        assert!(matches!(
            FFEffectDescriptor::try_from(&raw),
            Err(Error::UnknownWaveform(0x99))
        ));
    }

    #[test]
    fn initial_parameters() {
        assert_eq!(None, FFEffectKind::initial("BOGUS"));
        let rumble = FFEffectDescriptor::new(FFEffectKind::initial("RUMBLE").unwrap());
        assert_eq!(-1, rumble.id);
        assert_eq!(0xC000, rumble.direction);
        assert_eq!(
            FFEffectKind::Rumble {
                strong_magnitude: 0x6000,
                weak_magnitude: 0x2000
            },
            rumble.kind
        );
    }

    #[test]
    fn waveform_names() {
        for waveform in FFWaveform::ALL {
            assert_eq!(Some(waveform), FFWaveform::from_name(waveform.name()));
            assert_eq!(Some(waveform), FFWaveform::from_code(waveform.code()));
        }
    }
}
