use std::sync::atomic::{AtomicI16, Ordering};

use nix::errno::Errno;

use crate::config::Policies;
use crate::ff::{FFEffectDescriptor, FFEffectKind};

/// Direction value half way round the circle.
const HALF_TURN: u16 = 0x8000;
const QUARTER_TURN: u16 = 0x4000;

/// A correction applied to an outgoing upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fix {
    Direction,
    ForceInversion,
    Offset,
}

impl Fix {
    /// Tag appended to the trace line of the corrected upload.
    pub fn tag(self) -> &'static str {
        match self {
            Fix::Direction => "direction fix",
            Fix::ForceInversion => "force inversion fix",
            Fix::Offset => "offset fix",
        }
    }
}

/// What to report back to the caller after an upload reached the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadVerdict {
    /// Report the driver's answer unchanged.
    Keep,
    /// The driver refused to update an existing effect; upload it again as a new one.
    RetryWithFreshId,
    /// Pretend the upload worked, with this effect id.
    Spoof { id: i16 },
}

/// Applies the configured device quirk corrections.
#[derive(Debug)]
pub struct Normalizer {
    policies: Policies,
    next_spoofed_id: AtomicI16,
}

impl Normalizer {
    /// Ids handed out for uploads that failed under the features hack start here, clear of the
    /// ids a driver typically allocates first.
    pub const FIRST_SPOOFED_ID: i16 = 16;

    pub fn new(policies: Policies) -> Self {
        Self {
            policies,
            next_spoofed_id: AtomicI16::new(Self::FIRST_SPOOFED_ID),
        }
    }

    /// Rewrites `effect` in place, in the order direction fix, force inversion, offset fix.
    ///
    /// Returns every correction that changed something, each paired with the effect as it stood
    /// right after that correction.
    pub fn normalize(&self, effect: &mut FFEffectDescriptor) -> Vec<(Fix, FFEffectDescriptor)> {
        let mut applied = Vec::new();

        if self.fix_direction(&mut effect.direction) {
            applied.push((Fix::Direction, *effect));
        }

        if self.invert_force(&mut effect.direction) {
            applied.push((Fix::ForceInversion, *effect));
        }

        if self.policies.offset_fix {
            if let FFEffectKind::Periodic { offset, phase, .. } = &mut effect.kind {
                *offset = rescale_offset(*offset);
                *phase = rescale_phase(*phase);
                applied.push((Fix::Offset, *effect));
            }
        }

        applied
    }

    /// The direction corrections alone, for effects whose payload can't be decoded.
    ///
    /// Returns every correction that changed something with the direction it left behind.
    pub fn normalize_direction(&self, direction: &mut u16) -> Vec<(Fix, u16)> {
        let mut applied = Vec::new();
        if self.fix_direction(direction) {
            applied.push((Fix::Direction, *direction));
        }
        if self.invert_force(direction) {
            applied.push((Fix::ForceInversion, *direction));
        }
        applied
    }

    fn fix_direction(&self, direction: &mut u16) -> bool {
        let hit = self.policies.direction_fix && (*direction == 0 || *direction == HALF_TURN);
        if hit {
            *direction = direction.wrapping_sub(QUARTER_TURN);
        }
        hit
    }

    fn invert_force(&self, direction: &mut u16) -> bool {
        if self.policies.force_inversion {
            *direction = direction.wrapping_sub(HALF_TURN);
        }
        self.policies.force_inversion
    }

    /// Decides how to answer an upload of an effect that asked for `requested_id`.
    pub fn upload_verdict(&self, requested_id: i16, result: &nix::Result<()>) -> UploadVerdict {
        let Err(errno) = result else {
            return UploadVerdict::Keep;
        };

        if self.policies.update_fix && *errno == Errno::EINVAL && requested_id >= 0 {
            UploadVerdict::RetryWithFreshId
        } else if self.policies.features_hack {
            let id = if requested_id == -1 {
                self.next_spoofed_id.fetch_add(1, Ordering::Relaxed)
            } else {
                requested_id
            };
            UploadVerdict::Spoof { id }
        } else {
            UploadVerdict::Keep
        }
    }

    /// Whether a failed remove, or a failed play/stop write, should be reported as success.
    pub fn hides_failures(&self) -> bool {
        self.policies.features_hack
    }

    /// Whether the capability bitmap should claim every effect type.
    pub fn spoofs_features(&self) -> bool {
        self.policies.features_hack
    }

    /// Whether gain changes are swallowed.
    pub fn suppresses_gain(&self) -> bool {
        self.policies.ignore_set_gain
    }
}

/// 0..=10000 to the full positive i16 range.
fn rescale_offset(offset: i16) -> i16 {
    let scaled = i64::from(offset) * 0x7fff / 10000;
    scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

/// Hundredths of a degree, 0..=35999, to the full u16 range.
fn rescale_phase(phase: u16) -> u16 {
    let scaled = u32::from(phase) * 0xffff / 35999;
    scaled.min(u32::from(u16::MAX)) as u16
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ff::{FFEnvelope, FFWaveform};

    fn normalizer(policies: Policies) -> Normalizer {
        Normalizer::new(policies)
    }

    fn constant(direction: u16) -> FFEffectDescriptor {
        let mut effect = FFEffectDescriptor::new(FFEffectKind::initial("CONSTANT").unwrap());
        effect.direction = direction;
        effect
    }

    fn periodic(offset: i16, phase: u16) -> FFEffectDescriptor {
        FFEffectDescriptor::new(FFEffectKind::Periodic {
            waveform: FFWaveform::Square,
            period: 100,
            magnitude: 0x4000,
            offset,
            phase,
            envelope: FFEnvelope::default(),
        })
    }

    #[test]
    fn nothing_enabled_changes_nothing() {
        let mut effect = periodic(5000, 18000);
        let before = effect;
        assert!(normalizer(Policies::default()).normalize(&mut effect).is_empty());
        assert_eq!(before, effect);
    }

    #[test]
    fn direction_fix_targets_exact_values() {
        let n = normalizer(Policies {
            direction_fix: true,
            ..Policies::default()
        });

        let mut north = constant(0);
        assert_eq!(1, n.normalize(&mut north).len());
        assert_eq!(0xC000, north.direction);

        let mut south = constant(0x8000);
        n.normalize(&mut south);
        assert_eq!(0x4000, south.direction);

        let mut other = constant(0x8001);
        assert!(n.normalize(&mut other).is_empty());
        assert_eq!(0x8001, other.direction);
    }

    #[test]
    fn direction_fix_does_not_retrigger() {
        let n = normalizer(Policies {
            direction_fix: true,
            ..Policies::default()
        });
        let mut effect = constant(0);
        n.normalize(&mut effect);
        let fixed = effect.direction;
        assert!(n.normalize(&mut effect).is_empty());
        assert_eq!(fixed, effect.direction);
    }

    #[test]
    fn corrections_apply_in_order() {
        let n = normalizer(Policies {
            direction_fix: true,
            force_inversion: true,
            offset_fix: true,
            ..Policies::default()
        });
        let mut effect = periodic(10000, 35999);
        effect.direction = 0;
        let applied = n.normalize(&mut effect);

        let fixes: Vec<Fix> = applied.iter().map(|(fix, _)| *fix).collect();
        assert_eq!(vec![Fix::Direction, Fix::ForceInversion, Fix::Offset], fixes);
        assert_eq!(0xC000, applied[0].1.direction);
        assert_eq!(0x4000, applied[1].1.direction);
        assert_eq!(applied[2].1, effect);

        let FFEffectKind::Periodic { offset, phase, .. } = effect.kind else {
            unreachable!()
        };
        assert_eq!(0x7fff, offset);
        assert_eq!(0xffff, phase);
    }

    #[test]
    fn bare_directions_get_the_same_corrections() {
        let n = normalizer(Policies {
            direction_fix: true,
            force_inversion: true,
            offset_fix: true,
            ..Policies::default()
        });
        let mut direction = 0x8000;
        assert_eq!(
            vec![(Fix::Direction, 0x4000), (Fix::ForceInversion, 0xC000)],
            n.normalize_direction(&mut direction)
        );
        assert_eq!(0xC000, direction);

        let mut direction = 0x1234;
        assert!(normalizer(Policies::default())
            .normalize_direction(&mut direction)
            .is_empty());
        assert_eq!(0x1234, direction);
    }

    #[test]
    fn offset_fix_only_touches_periodic() {
        let n = normalizer(Policies {
            offset_fix: true,
            ..Policies::default()
        });
        let mut effect = constant(0x1234);
        assert!(n.normalize(&mut effect).is_empty());

        let mut effect = periodic(-5000, 9000);
        n.normalize(&mut effect);
        let FFEffectKind::Periodic { offset, phase, .. } = effect.kind else {
            unreachable!()
        };
        assert_eq!(-16383, offset);
        assert_eq!(16384, phase);
    }

    #[test]
    fn rescaling_saturates() {
        assert_eq!(i16::MAX, rescale_offset(i16::MAX));
        assert_eq!(i16::MIN, rescale_offset(i16::MIN));
        assert_eq!(u16::MAX, rescale_phase(u16::MAX));
        assert_eq!(0, rescale_phase(0));
    }

    #[test]
    fn upload_verdicts() {
        let plain = normalizer(Policies::default());
        assert_eq!(UploadVerdict::Keep, plain.upload_verdict(3, &Err(Errno::EINVAL)));
        assert_eq!(UploadVerdict::Keep, plain.upload_verdict(3, &Ok(())));

        let update = normalizer(Policies {
            update_fix: true,
            ..Policies::default()
        });
        assert_eq!(
            UploadVerdict::RetryWithFreshId,
            update.upload_verdict(3, &Err(Errno::EINVAL))
        );
        assert_eq!(UploadVerdict::Keep, update.upload_verdict(-1, &Err(Errno::EINVAL)));
        assert_eq!(UploadVerdict::Keep, update.upload_verdict(3, &Err(Errno::ENOSPC)));

        let hack = normalizer(Policies {
            features_hack: true,
            ..Policies::default()
        });
        assert_eq!(
            UploadVerdict::Spoof { id: 16 },
            hack.upload_verdict(-1, &Err(Errno::ENOSPC))
        );
        assert_eq!(
            UploadVerdict::Spoof { id: 17 },
            hack.upload_verdict(-1, &Err(Errno::EIO))
        );
        assert_eq!(
            UploadVerdict::Spoof { id: 4 },
            hack.upload_verdict(4, &Err(Errno::EIO))
        );
        assert_eq!(UploadVerdict::Keep, hack.upload_verdict(-1, &Ok(())));
    }
}
