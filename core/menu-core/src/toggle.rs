//! Expand/collapse request handling, uniform across mouse, touch and keyboard.
//!
//! Each node runs a two-state machine: `Idle → Processing → Idle`. A request
//! is accepted only while the node is idle; anything that arrives during
//! processing is dropped, never queued. Touch browsers deliver a tap as
//! several events in quick succession, and the cooldown is what keeps one tap
//! from opening a submenu and immediately closing it again.
//!
//! The device class is detected once when the controller is built and never
//! re-evaluated. It picks a [`ToggleStrategy`]; both strategies drive the
//! same machine, only the cooldown length differs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::expansion::ExpansionState;
use crate::types::NodeId;

/// Capability signals reported by the host at mount time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// `ontouchstart` is available.
    #[serde(default)]
    pub touch_start: bool,
    #[serde(default)]
    pub max_touch_points: u32,
    /// Legacy `DocumentTouch` interface.
    #[serde(default)]
    pub document_touch: bool,
}

impl DeviceCapabilities {
    /// First positive signal wins.
    pub fn classify(&self) -> DeviceClass {
        if self.touch_start || self.max_touch_points > 0 || self.document_touch {
            DeviceClass::Touch
        } else {
            DeviceClass::Pointer
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Touch,
    Pointer,
}

/// Where a toggle request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleSource {
    /// Click or tap.
    Press,
    /// Enter or Space on a focused entry.
    Keyboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleStrategy {
    Cooldown(Duration),
    Immediate,
}

impl ToggleStrategy {
    pub fn for_device(device: DeviceClass, cooldown: Duration) -> Self {
        match device {
            DeviceClass::Touch => ToggleStrategy::Cooldown(cooldown),
            DeviceClass::Pointer => ToggleStrategy::Immediate,
        }
    }

    fn cooldown_for(&self, source: ToggleSource) -> Duration {
        match (self, source) {
            (_, ToggleSource::Keyboard) => Duration::zero(),
            (ToggleStrategy::Cooldown(cooldown), ToggleSource::Press) => *cooldown,
            (ToggleStrategy::Immediate, ToggleSource::Press) => Duration::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Idle,
    Processing { until: DateTime<Utc> },
}

/// Result handed back to the parent of the toggled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Accepted { id: NodeId, expanded: bool },
    Dropped { id: NodeId },
}

impl ToggleOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ToggleOutcome::Accepted { .. })
    }
}

#[derive(Debug)]
pub struct ToggleController {
    device: DeviceClass,
    strategy: ToggleStrategy,
    clock: Arc<dyn Clock>,
    processing: HashMap<NodeId, DateTime<Utc>>,
}

impl ToggleController {
    pub fn new(capabilities: DeviceCapabilities, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        let device = capabilities.classify();
        Self {
            device,
            strategy: ToggleStrategy::for_device(device, cooldown),
            clock,
            processing: HashMap::new(),
        }
    }

    pub fn device(&self) -> DeviceClass {
        self.device
    }

    pub fn strategy(&self) -> ToggleStrategy {
        self.strategy
    }

    pub fn state(&self, id: NodeId) -> ToggleState {
        match self.processing.get(&id) {
            Some(&until) if self.clock.now() < until => ToggleState::Processing { until },
            _ => ToggleState::Idle,
        }
    }

    pub fn request(
        &mut self,
        id: NodeId,
        source: ToggleSource,
        expansion: &mut ExpansionState,
    ) -> ToggleOutcome {
        let now = self.clock.now();
        if let Some(&until) = self.processing.get(&id) {
            if now < until {
                debug!(node_id = id, ?source, "Toggle dropped while processing");
                return ToggleOutcome::Dropped { id };
            }
            self.processing.remove(&id);
        }

        let expanded = expansion.toggle(id);
        let cooldown = self.strategy.cooldown_for(source);
        if cooldown > Duration::zero() {
            self.processing.insert(id, now + cooldown);
        }

        debug!(node_id = id, expanded, ?source, device = ?self.device, "Toggle accepted");
        ToggleOutcome::Accepted { id, expanded }
    }

    /// Forgets pending cooldowns, e.g. when the tree is replaced.
    pub fn reset(&mut self) {
        self.processing.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TOUCH: DeviceCapabilities = DeviceCapabilities {
        touch_start: true,
        max_touch_points: 0,
        document_touch: false,
    };

    fn controller(capabilities: DeviceCapabilities) -> (ToggleController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let controller =
            ToggleController::new(capabilities, Duration::milliseconds(200), clock.clone());
        (controller, clock)
    }

    #[test]
    fn classification_takes_first_positive_signal() {
        assert_eq!(DeviceCapabilities::default().classify(), DeviceClass::Pointer);
        assert_eq!(TOUCH.classify(), DeviceClass::Touch);
        let points = DeviceCapabilities {
            max_touch_points: 5,
            ..Default::default()
        };
        assert_eq!(points.classify(), DeviceClass::Touch);
        let legacy = DeviceCapabilities {
            document_touch: true,
            ..Default::default()
        };
        assert_eq!(legacy.classify(), DeviceClass::Touch);
    }

    #[test]
    fn touch_double_fire_within_cooldown_changes_once() {
        let (mut controller, clock) = controller(TOUCH);
        let mut expansion = ExpansionState::new();

        let first = controller.request(1, ToggleSource::Press, &mut expansion);
        clock.advance(Duration::milliseconds(40));
        let second = controller.request(1, ToggleSource::Press, &mut expansion);

        assert_eq!(first, ToggleOutcome::Accepted { id: 1, expanded: true });
        assert_eq!(second, ToggleOutcome::Dropped { id: 1 });
        assert!(expansion.is_expanded(1));
    }

    #[test]
    fn touch_returns_to_idle_after_cooldown() {
        let (mut controller, clock) = controller(TOUCH);
        let mut expansion = ExpansionState::new();

        controller.request(1, ToggleSource::Press, &mut expansion);
        assert!(matches!(controller.state(1), ToggleState::Processing { .. }));

        clock.advance(Duration::milliseconds(200));
        assert_eq!(controller.state(1), ToggleState::Idle);

        let outcome = controller.request(1, ToggleSource::Press, &mut expansion);
        assert_eq!(outcome, ToggleOutcome::Accepted { id: 1, expanded: false });
    }

    #[test]
    fn cooldown_is_per_node() {
        let (mut controller, _clock) = controller(TOUCH);
        let mut expansion = ExpansionState::new();

        assert!(controller.request(1, ToggleSource::Press, &mut expansion).is_accepted());
        assert!(controller.request(2, ToggleSource::Press, &mut expansion).is_accepted());
        assert_eq!(expansion.expanded_ids(), vec![1, 2]);
    }

    #[test]
    fn pointer_toggles_synchronously() {
        let (mut controller, _clock) = controller(DeviceCapabilities::default());
        let mut expansion = ExpansionState::new();

        assert_eq!(controller.strategy(), ToggleStrategy::Immediate);
        assert!(controller.request(1, ToggleSource::Press, &mut expansion).is_accepted());
        assert_eq!(controller.state(1), ToggleState::Idle);
        assert!(controller.request(1, ToggleSource::Press, &mut expansion).is_accepted());
        assert!(!expansion.is_expanded(1));
    }

    #[test]
    fn keyboard_skips_cooldown_on_touch_devices() {
        let (mut controller, _clock) = controller(TOUCH);
        let mut expansion = ExpansionState::new();

        assert!(controller.request(1, ToggleSource::Keyboard, &mut expansion).is_accepted());
        assert_eq!(controller.state(1), ToggleState::Idle);
        assert!(controller.request(1, ToggleSource::Keyboard, &mut expansion).is_accepted());
        assert!(!expansion.is_expanded(1));
    }

    #[test]
    fn reset_clears_pending_cooldowns() {
        let (mut controller, _clock) = controller(TOUCH);
        let mut expansion = ExpansionState::new();

        controller.request(1, ToggleSource::Press, &mut expansion);
        controller.reset();
        assert_eq!(controller.state(1), ToggleState::Idle);
    }
}
