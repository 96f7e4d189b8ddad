// SPDX-License-Identifier: CEPL-1.0
use tracing::trace;

use crate::{FrameBackend, FrameError, FrameResult, SlotFences, MAX_FRAMES_IN_FLIGHT};

/// Lifecycle of one frame slot: `Idle -> Submitted -> Complete -> Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Claimed by the CPU for the frame being built.
    Idle,
    /// GPU work outstanding; the slot fence is unsignalled.
    Submitted,
    /// Fence observed signalled.
    Complete,
}

/// Tracks the slot ring and which slot last rendered into each chain image.
///
/// Slots and images are sized independently: the ring is fixed at
/// [`MAX_FRAMES_IN_FLIGHT`], the image table follows whatever count the
/// surface handed out on the last rebuild.
#[derive(Debug)]
pub struct FrameSyncController {
    slots: [SlotState; MAX_FRAMES_IN_FLIGHT],
    owners: Vec<Option<usize>>,
}

impl FrameSyncController {
    /// Fences start signalled, so every slot starts out `Complete`.
    pub fn new(image_count: usize) -> Self {
        Self {
            slots: [SlotState::Complete; MAX_FRAMES_IN_FLIGHT],
            owners: vec![None; image_count],
        }
    }

    pub fn begin_frame<F: SlotFences>(&mut self, fences: &mut F, slot: usize) -> FrameResult<()> {
        check_slot(slot)?;
        fences.wait_slot(slot)?;
        self.slots[slot] = SlotState::Idle;
        Ok(())
    }

    /// Makes `slot` the owner of `image`, first waiting out the previous
    /// owner if its work on that image may still be running.
    pub fn claim_image<F: SlotFences>(
        &mut self,
        fences: &mut F,
        slot: usize,
        image: usize,
    ) -> FrameResult<()> {
        check_slot(slot)?;
        let count = self.owners.len();
        let owner = self.owners.get_mut(image).ok_or_else(|| {
            FrameError::backend("claim_image", format!("image {image} out of range 0..{count}"))
        })?;
        if let Some(prev) = *owner {
            if prev != slot && self.slots[prev] == SlotState::Submitted {
                trace!(image, prev, slot, "image still in flight, waiting on owner");
                fences.wait_slot(prev)?;
                self.slots[prev] = SlotState::Complete;
            }
        }
        *owner = Some(slot);
        Ok(())
    }

    pub fn submit<B: FrameBackend>(&mut self, backend: &mut B, slot: usize, image: u32) -> FrameResult<()> {
        check_slot(slot)?;
        backend.reset_slot(slot)?;
        backend.submit(slot, image)?;
        self.slots[slot] = SlotState::Submitted;
        Ok(())
    }

    /// Call after a full-idle wait.
    pub fn mark_all_complete(&mut self) {
        self.slots = [SlotState::Complete; MAX_FRAMES_IN_FLIGHT];
    }

    pub fn reset_images(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    pub fn image_count(&self) -> usize {
        self.owners.len()
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).copied()
    }

    pub fn owner(&self, image: usize) -> Option<usize> {
        self.owners.get(image).copied().flatten()
    }

    pub fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| **s == SlotState::Submitted)
            .count()
    }
}

fn check_slot(slot: usize) -> FrameResult<()> {
    if slot < MAX_FRAMES_IN_FLIGHT {
        Ok(())
    } else {
        Err(FrameError::backend(
            "frame slot",
            format!("{slot} out of range 0..{MAX_FRAMES_IN_FLIGHT}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, FakeBackend};

    #[test]
    fn starts_complete_with_empty_ownership() {
        let sync = FrameSyncController::new(3);
        assert_eq!(sync.image_count(), 3);
        assert_eq!(sync.state(0), Some(SlotState::Complete));
        assert_eq!(sync.state(1), Some(SlotState::Complete));
        assert_eq!(sync.state(2), None);
        assert_eq!(sync.owner(0), None);
        assert_eq!(sync.outstanding(), 0);
    }

    #[test]
    fn slot_walks_through_its_states() {
        let mut be = FakeBackend::with_images(3);
        let mut sync = FrameSyncController::new(3);

        sync.begin_frame(&mut be, 0).unwrap();
        assert_eq!(sync.state(0), Some(SlotState::Idle));
        sync.claim_image(&mut be, 0, 1).unwrap();
        sync.submit(&mut be, 0, 1).unwrap();
        assert_eq!(sync.state(0), Some(SlotState::Submitted));
        assert_eq!(sync.outstanding(), 1);
        assert_eq!(sync.owner(1), Some(0));

        assert_eq!(
            be.log,
            vec![Event::WaitSlot(0), Event::ResetSlot(0), Event::Submit(0, 1)]
        );
    }

    #[test]
    fn claiming_an_image_in_flight_waits_on_its_owner() {
        let mut be = FakeBackend::with_images(3);
        let mut sync = FrameSyncController::new(3);

        sync.begin_frame(&mut be, 0).unwrap();
        sync.claim_image(&mut be, 0, 2).unwrap();
        sync.submit(&mut be, 0, 2).unwrap();

        sync.begin_frame(&mut be, 1).unwrap();
        be.log.clear();
        sync.claim_image(&mut be, 1, 2).unwrap();
        assert_eq!(be.log, vec![Event::WaitSlot(0)]);
        assert_eq!(sync.state(0), Some(SlotState::Complete));
        assert_eq!(sync.owner(2), Some(1));
    }

    #[test]
    fn no_wait_when_owner_already_complete_or_same_slot() {
        let mut be = FakeBackend::with_images(2);
        let mut sync = FrameSyncController::new(2);

        sync.begin_frame(&mut be, 0).unwrap();
        sync.claim_image(&mut be, 0, 0).unwrap();
        sync.submit(&mut be, 0, 0).unwrap();
        sync.mark_all_complete();

        be.log.clear();
        sync.claim_image(&mut be, 1, 0).unwrap();
        sync.claim_image(&mut be, 1, 0).unwrap();
        assert!(be.log.is_empty());
    }

    #[test]
    fn out_of_range_image_is_an_error() {
        let mut be = FakeBackend::with_images(2);
        let mut sync = FrameSyncController::new(2);
        assert!(sync.claim_image(&mut be, 0, 2).is_err());
        assert!(sync.begin_frame(&mut be, MAX_FRAMES_IN_FLIGHT).is_err());
    }

    #[test]
    fn reset_images_resizes_and_clears() {
        let mut be = FakeBackend::with_images(2);
        let mut sync = FrameSyncController::new(2);
        sync.claim_image(&mut be, 0, 1).unwrap();
        sync.reset_images(4);
        assert_eq!(sync.image_count(), 4);
        assert!((0..4).all(|i| sync.owner(i).is_none()));
        sync.reset_images(1);
        assert_eq!(sync.image_count(), 1);
    }
}
