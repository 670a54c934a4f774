//! Multi-tap haptic patterns built from single engine taps.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::ValidationError;
use crate::platform::{HapticEngine, HapticKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticPattern {
    /// One notification tap.
    SingleTap,
    /// Six quick clicks.
    #[default]
    RapidFire,
    /// Soft, strong, soft.
    Wave,
}

impl HapticPattern {
    pub const ALL: [HapticPattern; 3] = [Self::SingleTap, Self::RapidFire, Self::Wave];

    /// Taps to play and the gap after each one.
    pub fn sequence(self) -> (&'static [HapticKind], Duration) {
        const SINGLE: &[HapticKind] = &[HapticKind::Notification];
        const RAPID: &[HapticKind] = &[HapticKind::Click; 6];
        const WAVE: &[HapticKind] = &[
            HapticKind::Click,
            HapticKind::DirectionUp,
            HapticKind::Success,
            HapticKind::DirectionDown,
            HapticKind::Click,
        ];
        match self {
            Self::SingleTap => (SINGLE, Duration::ZERO),
            Self::RapidFire => (RAPID, Duration::from_millis(150)),
            Self::Wave => (WAVE, Duration::from_millis(220)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SingleTap => "single_tap",
            Self::RapidFire => "rapid_fire",
            Self::Wave => "wave",
        }
    }
}

impl fmt::Display for HapticPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HapticPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.name() == normalized)
            .ok_or_else(|| ValidationError::UnknownPattern(s.to_string()))
    }
}

/// Plays [`HapticPattern`]s on a [`HapticEngine`].
#[derive(Clone)]
pub struct HapticPlayer {
    engine: Arc<dyn HapticEngine>,
}

impl HapticPlayer {
    pub fn new(engine: Arc<dyn HapticEngine>) -> Self {
        Self { engine }
    }

    /// Fire-and-forget. The first tap plays before this returns; the rest
    /// of a multi-tap pattern continues on the runtime.
    pub fn play(&self, pattern: HapticPattern) {
        let (taps, gap) = pattern.sequence();
        let Some((first, rest)) = taps.split_first() else {
            return;
        };
        self.engine.play(*first);
        if rest.is_empty() {
            return;
        }
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            for tap in rest {
                sleep(gap).await;
                engine.play(*tap);
            }
        });
    }

    /// Play a pattern and wait until its last gap has elapsed.
    pub async fn play_and_wait(&self, pattern: HapticPattern) {
        let (taps, gap) = pattern.sequence();
        for tap in taps {
            self.engine.play(*tap);
            sleep(gap).await;
        }
    }
}
