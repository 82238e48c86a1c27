//! Activation ordering.
//!
//! Cores are brought online and offline along a fixed priority order; the
//! sequencer's index always points at the highest occupied position. `Up`
//! peeks the next position, so a failed platform transition leaves the index
//! untouched and the decision retries on a later tick. The index invariant
//! `min_cpus-1 <= index <= max_cpus-1` is enforced here for up/down steps
//! and re-established by the governor on every other mutation path.

use crate::error::TransitionError;
use crate::platform::CpuControl;
use tracing::debug;

/// Stock priority order for the 6-core topology this governor was tuned on:
/// the two low-power cores first, then one performance core, then the rest.
pub const DEFAULT_ACTIVATION_ORDER: [u32; 6] = [0, 1, 4, 2, 3, 5];

/// What one sequencer step actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Onlined(u32),
    Offlined(u32),
    /// An `Up` found the next position past the `max_cpus` ceiling and
    /// offlined it instead.
    CorrectiveOffline(u32),
    /// `Up` rejected: already at the last position of the order.
    AtCeiling,
    /// `Down` rejected: offlining would go below the `min_cpus` floor.
    AtFloor,
}

pub struct ActivationSequencer {
    order: Vec<u32>,
    index: usize,
}

impl ActivationSequencer {
    /// Sequencer over an explicit order. The order must be non-empty and is
    /// expected to start with a core that cannot be offlined (core 0).
    pub fn new(order: Vec<u32>) -> Self {
        debug_assert!(!order.is_empty());
        Self { order, index: 0 }
    }

    /// Stock order adapted to `nr_cpus`: the tuned 6-core order filtered to
    /// existing cores, any further cores appended in ascending id order.
    pub fn for_topology(nr_cpus: u32) -> Self {
        let nr_cpus = nr_cpus.max(1);
        let mut order: Vec<u32> = DEFAULT_ACTIVATION_ORDER
            .iter()
            .copied()
            .filter(|&c| c < nr_cpus)
            .collect();
        order.extend(DEFAULT_ACTIVATION_ORDER.len() as u32..nr_cpus);
        Self::new(order)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Core id at an order position.
    pub fn core_at(&self, position: usize) -> u32 {
        self.order[position]
    }

    /// Force the index to a position, clamped into the order.
    pub fn set_index(&mut self, index: usize) {
        self.index = index.min(self.order.len() - 1);
    }

    /// Re-establish the index invariant after a bounds change.
    pub fn clamp_index(&mut self, min_cpus: u32, max_cpus: u32) {
        let floor = (min_cpus as usize).saturating_sub(1);
        let ceiling = (max_cpus as usize)
            .saturating_sub(1)
            .min(self.order.len() - 1);
        self.index = self.index.clamp(floor.min(ceiling), ceiling);
    }

    /// Act on an `Up` decision: online the next core in the order.
    ///
    /// If the next position sits past the `max_cpus` ceiling (possible after
    /// the ceiling was lowered), that core is brought offline instead and
    /// the index stays put — converting the over-ceiling up into a
    /// corrective down.
    pub fn step_up(
        &mut self,
        max_cpus: u32,
        cpu: &dyn CpuControl,
    ) -> Result<StepOutcome, TransitionError> {
        let next = self.index + 1;
        if next >= self.order.len() {
            return Ok(StepOutcome::AtCeiling);
        }
        let core = self.order[next];
        if next > (max_cpus as usize).saturating_sub(1) {
            cpu.bring_offline(core)?;
            debug!("corrective offline of core {} (ceiling {})", core, max_cpus);
            return Ok(StepOutcome::CorrectiveOffline(core));
        }
        cpu.bring_online(core)?;
        self.index = next;
        Ok(StepOutcome::Onlined(core))
    }

    /// Act on a `Down` decision: offline the core at the current position.
    ///
    /// Never deactivates past the `min_cpus` floor; the request becomes a
    /// no-op instead.
    pub fn step_down(
        &mut self,
        min_cpus: u32,
        cpu: &dyn CpuControl,
    ) -> Result<StepOutcome, TransitionError> {
        if self.index < min_cpus as usize {
            return Ok(StepOutcome::AtFloor);
        }
        let core = self.order[self.index];
        cpu.bring_offline(core)?;
        self.index -= 1;
        Ok(StepOutcome::Offlined(core))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimCpu;

    fn sequencer() -> ActivationSequencer {
        ActivationSequencer::for_topology(6)
    }

    #[test]
    fn test_topology_adaptation() {
        assert_eq!(sequencer().order, vec![0, 1, 4, 2, 3, 5]);
        assert_eq!(ActivationSequencer::for_topology(4).order, vec![0, 1, 2, 3]);
        assert_eq!(
            ActivationSequencer::for_topology(8).order,
            vec![0, 1, 4, 2, 3, 5, 6, 7]
        );
        assert_eq!(ActivationSequencer::for_topology(1).order, vec![0]);
    }

    #[test]
    fn test_up_follows_priority_order() {
        let sim = SimCpu::new(6);
        let mut seq = sequencer();
        let mut onlined = Vec::new();
        while let Ok(StepOutcome::Onlined(core)) = seq.step_up(6, &sim) {
            onlined.push(core);
        }
        assert_eq!(onlined, vec![1, 4, 2, 3, 5]);
        assert_eq!(seq.index(), 5);
        assert_eq!(sim.online_count(), 6);
    }

    #[test]
    fn test_up_rejected_at_end_of_order() {
        let sim = SimCpu::new(6);
        let mut seq = sequencer();
        seq.set_index(5);
        assert_eq!(seq.step_up(6, &sim).unwrap(), StepOutcome::AtCeiling);
        assert_eq!(seq.index(), 5);
    }

    #[test]
    fn test_down_reverses_priority_order() {
        let sim = SimCpu::new(6);
        let mut seq = sequencer();
        while !matches!(seq.step_up(6, &sim), Ok(StepOutcome::AtCeiling)) {}

        let mut offlined = Vec::new();
        while let Ok(StepOutcome::Offlined(core)) = seq.step_down(1, &sim) {
            offlined.push(core);
        }
        assert_eq!(offlined, vec![5, 3, 2, 4, 1]);
        assert_eq!(seq.index(), 0);
        assert_eq!(sim.online_cores(), vec![0]);
    }

    #[test]
    fn test_down_rejected_at_floor() {
        let sim = SimCpu::new(6);
        let mut seq = sequencer();
        assert_eq!(seq.step_down(1, &sim).unwrap(), StepOutcome::AtFloor);
        assert_eq!(seq.index(), 0);
        assert!(sim.is_online(0));

        // With a floor of two cores, position 1 is also protected.
        seq.step_up(6, &sim).unwrap();
        assert_eq!(seq.step_down(2, &sim).unwrap(), StepOutcome::AtFloor);
        assert!(sim.is_online(1));
    }

    #[test]
    fn test_up_past_lowered_ceiling_is_corrective() {
        let sim = SimCpu::new(6);
        let mut seq = sequencer();
        seq.step_up(6, &sim).unwrap(); // core 1
        seq.step_up(6, &sim).unwrap(); // core 4, index 2
        assert!(sim.is_online(4));

        // Ceiling lowered to 2 while the index sits at 2: the next up must
        // offline the over-ceiling position instead of onlining another core.
        seq.clamp_index(1, 2);
        assert_eq!(seq.index(), 1);
        assert_eq!(
            seq.step_up(2, &sim).unwrap(),
            StepOutcome::CorrectiveOffline(4)
        );
        assert_eq!(seq.index(), 1);
        assert!(!sim.is_online(4));
    }

    #[test]
    fn test_refused_transition_rolls_back_index() {
        let sim = SimCpu::new(6);
        let mut seq = sequencer();
        sim.refuse_transitions(1, true);
        assert!(seq.step_up(6, &sim).is_err());
        assert_eq!(seq.index(), 0);

        // Retry on the next tick succeeds once the platform recovers.
        sim.refuse_transitions(1, false);
        assert_eq!(seq.step_up(6, &sim).unwrap(), StepOutcome::Onlined(1));
        assert_eq!(seq.index(), 1);

        // Same on the way down.
        sim.refuse_transitions(1, true);
        assert!(seq.step_down(1, &sim).is_err());
        assert_eq!(seq.index(), 1);
    }

    #[test]
    fn test_clamp_index_bounds() {
        let mut seq = sequencer();
        seq.set_index(5);
        seq.clamp_index(1, 4);
        assert_eq!(seq.index(), 3);
        seq.clamp_index(3, 6);
        assert_eq!(seq.index(), 3);
        seq.set_index(0);
        seq.clamp_index(3, 6);
        assert_eq!(seq.index(), 2);
    }
}
