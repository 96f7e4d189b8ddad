// SPDX-License-Identifier: CEPL-1.0
//! Scripted backend and host for driving `FramePipeline` without a GPU.
use std::cell::Cell;
use std::collections::VecDeque;

use mandel_math::ColorMode;

use crate::{
    Acquire, ChainDescriptor, FractalUniforms, FrameBackend, FrameError, FrameResult, Presented,
    RenderSize, SlotFences, SurfaceHost, MAX_FRAMES_IN_FLIGHT,
};

/// Backend calls that can be scripted to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    WaitSlot,
    BuildChain,
    BuildSets,
    Acquire,
    Present,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    WaitSlot(usize),
    ResetSlot(usize),
    WaitIdle,
    BuildChain(RenderSize),
    DestroyChain,
    BuildSets(usize),
    DestroySets,
    RebuildPipeline(ColorMode),
    Record,
    Acquire(usize),
    Update(u32),
    Submit(usize, u32),
    Present(usize, u32),
}

/// Records every call and models the GPU just enough to catch ordering bugs:
/// work submitted from a slot counts as running until that slot's fence is
/// waited or the device is idled.
#[derive(Debug)]
pub struct FakeBackend {
    pub log: Vec<Event>,
    /// Image counts for upcoming chain builds; once empty the last count repeats.
    pub image_counts: VecDeque<usize>,
    /// Scripted acquire results; `None` entries fall back to round-robin.
    pub acquire_script: VecDeque<Option<Acquire>>,
    pub present_script: VecDeque<Presented>,
    /// Build one resource set fewer than there are images.
    pub short_sets: bool,
    pub violations: Vec<String>,
    pub images: usize,
    pub sets: usize,
    pub pipeline_color: Option<ColorMode>,
    /// Errors handed out by the next call of the matching kind, in order.
    pub fail: VecDeque<(Op, FrameError)>,
    image_count: usize,
    generation: u64,
    next_image: u32,
    running: [Option<u32>; MAX_FRAMES_IN_FLIGHT],
}

impl FakeBackend {
    pub fn with_images(image_count: usize) -> Self {
        Self {
            log: Vec::new(),
            image_counts: VecDeque::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            short_sets: false,
            violations: Vec::new(),
            images: 0,
            sets: 0,
            pipeline_color: Some(ColorMode::Rgb),
            fail: VecDeque::new(),
            image_count,
            generation: 0,
            next_image: 0,
            running: [None; MAX_FRAMES_IN_FLIGHT],
        }
    }

    fn busy(&self) -> bool {
        self.running.iter().any(Option::is_some)
    }

    pub fn fail_next(&mut self, op: Op, err: FrameError) {
        self.fail.push_back((op, err));
    }

    fn injected(&mut self, op: Op) -> FrameResult<()> {
        let Some(i) = self.fail.iter().position(|(o, _)| *o == op) else {
            return Ok(());
        };
        match self.fail.remove(i) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    fn expect_idle(&mut self, what: &str) {
        if self.busy() {
            self.violations
                .push(format!("{what} while GPU work is outstanding: {:?}", self.running));
        }
    }
}

impl SlotFences for FakeBackend {
    fn wait_slot(&mut self, slot: usize) -> FrameResult<()> {
        self.log.push(Event::WaitSlot(slot));
        self.injected(Op::WaitSlot)?;
        self.running[slot] = None;
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> FrameResult<()> {
        self.log.push(Event::ResetSlot(slot));
        if self.running[slot].is_some() {
            self.violations.push(format!("fence {slot} reset while pending"));
        }
        Ok(())
    }
}

impl FrameBackend for FakeBackend {
    fn wait_idle(&mut self) -> FrameResult<()> {
        self.log.push(Event::WaitIdle);
        self.running = [None; MAX_FRAMES_IN_FLIGHT];
        Ok(())
    }

    fn build_chain(&mut self, size: RenderSize) -> FrameResult<ChainDescriptor> {
        self.log.push(Event::BuildChain(size));
        self.injected(Op::BuildChain)?;
        if size.is_empty() {
            self.violations.push("chain built for an empty drawable".into());
        }
        if let Some(n) = self.image_counts.pop_front() {
            self.image_count = n;
        }
        self.images = self.image_count;
        self.generation += 1;
        self.next_image = 0;
        Ok(ChainDescriptor {
            image_count: self.images,
            extent: size,
            generation: self.generation,
            format: "FAKE_SRGB".into(),
            present_mode: "FAKE_FIFO".into(),
        })
    }

    fn destroy_chain(&mut self) {
        self.log.push(Event::DestroyChain);
        self.expect_idle("chain destroyed");
        self.images = 0;
    }

    fn build_resource_sets(&mut self, chain: &ChainDescriptor) -> FrameResult<usize> {
        self.log.push(Event::BuildSets(chain.image_count));
        self.injected(Op::BuildSets)?;
        self.sets = if self.short_sets {
            chain.image_count.saturating_sub(1)
        } else {
            chain.image_count
        };
        Ok(self.sets)
    }

    fn destroy_resource_sets(&mut self) {
        self.log.push(Event::DestroySets);
        self.expect_idle("resource sets destroyed");
        self.sets = 0;
    }

    fn pipeline_matches(&self, color: ColorMode) -> bool {
        self.pipeline_color == Some(color)
    }

    fn rebuild_pipeline(&mut self, color: ColorMode) -> FrameResult<()> {
        self.log.push(Event::RebuildPipeline(color));
        self.expect_idle("pipeline rebuilt");
        self.pipeline_color = Some(color);
        Ok(())
    }

    fn record_commands(&mut self) -> FrameResult<()> {
        self.log.push(Event::Record);
        self.expect_idle("commands recorded");
        if self.sets != self.images {
            self.violations.push(format!(
                "recorded {} sets against {} images",
                self.sets, self.images
            ));
        }
        Ok(())
    }

    fn acquire_next(&mut self, slot: usize, _timeout_ns: u64) -> FrameResult<Acquire> {
        self.log.push(Event::Acquire(slot));
        self.injected(Op::Acquire)?;
        if self.images == 0 {
            self.violations.push("acquire without a chain".into());
        }
        if let Some(Some(scripted)) = self.acquire_script.pop_front() {
            return Ok(scripted);
        }
        let index = self.next_image % self.images.max(1) as u32;
        self.next_image += 1;
        Ok(Acquire::Image {
            index,
            suboptimal: false,
        })
    }

    fn update_uniforms(&mut self, image: u32, _uniforms: &FractalUniforms) -> FrameResult<()> {
        self.log.push(Event::Update(image));
        if self.running.contains(&Some(image)) {
            self.violations
                .push(format!("image {image} updated while the GPU still reads it"));
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize, image: u32) -> FrameResult<()> {
        self.log.push(Event::Submit(slot, image));
        self.running[slot] = Some(image);
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> FrameResult<Presented> {
        self.log.push(Event::Present(slot, image));
        self.injected(Op::Present)?;
        Ok(self.present_script.pop_front().unwrap_or(Presented::Shown))
    }
}

/// Window stand-in. Queued sizes are handed out one per poll; once the queue
/// runs dry the last size sticks.
#[derive(Default)]
pub struct TestHost {
    size: Cell<RenderSize>,
    queued: Cell<Vec<RenderSize>>,
    polls: Cell<usize>,
    pub resized: bool,
    pub close: bool,
    pub waits: usize,
}

impl TestHost {
    pub fn new(size: RenderSize) -> Self {
        Self {
            size: Cell::new(size),
            ..Default::default()
        }
    }

    pub fn resize_to(&mut self, size: RenderSize) {
        self.size.set(size);
        self.resized = true;
    }

    pub fn queue_sizes(&mut self, sizes: impl IntoIterator<Item = RenderSize>) {
        self.queued.get_mut().extend(sizes);
    }

    pub fn polls(&self) -> usize {
        self.polls.get()
    }
}

impl SurfaceHost for TestHost {
    fn drawable_size(&self) -> RenderSize {
        self.polls.set(self.polls.get() + 1);
        let mut queued = self.queued.take();
        if !queued.is_empty() {
            self.size.set(queued.remove(0));
        }
        self.queued.set(queued);
        self.size.get()
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn close_requested(&self) -> bool {
        self.close
    }

    fn wait_for_events(&mut self) {
        self.waits += 1;
    }
}
