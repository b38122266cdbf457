//! Per-frame submission state machine.
//!
//! [`FrameDriver`] runs the acquire, record, submit and present sequence
//! against a [`FrameTarget`] and handles stale surfaces by asking the
//! target to rebuild. The driver holds no GPU objects, so the whole state
//! machine can be exercised with a scripted target.
//!
//! ```text
//! Ready --draw--> acquire --ok--> record --> submit --> present --ok--> Ready
//!                    |                                     |
//!                out of date                 out of date / suboptimal
//!                    v                                     v
//!                  Stale ------------ rebuild ----------> Ready
//!                    ^                   |
//!                    +--- 0x0 drawable --+
//! ```

use ash::vk;
use tracing::{debug, error, info, trace};

use lantern_rhi::{RhiError, RhiResult};

/// Whether the swapchain-dependent resources match the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Ready,
    /// A rebuild is pending, either requested or deferred.
    Stale,
}

/// Result of one [`FrameDriver::draw`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// An image was queued for presentation and the chain is still valid.
    Presented,
    /// The chain was rebuilt during this call.
    Rebuilt,
    /// The chain is stale and cannot be rebuilt yet; nothing was drawn.
    Deferred,
}

/// Classified result of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

/// Classified result of queueing a present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the chain no longer matches the surface exactly.
    Suboptimal,
    /// Not presented; the chain must be rebuilt.
    OutOfDate,
}

impl PresentOutcome {
    pub fn was_presented(self) -> bool {
        !matches!(self, PresentOutcome::OutOfDate)
    }

    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Result of a rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Rebuilt,
    /// The drawable area is empty; try again on a later frame.
    Deferred,
}

/// Wraps a device result that has no recovery path.
pub fn unrecoverable(operation: &'static str, result: vk::Result) -> RhiError {
    error!("Unrecoverable device result during {}: {:?}", operation, result);
    RhiError::Unrecoverable { operation, result }
}

/// Upgrades a raw Vulkan error from a per-frame call to
/// [`RhiError::Unrecoverable`]. Other errors pass through.
pub fn escalate(operation: &'static str, err: RhiError) -> RhiError {
    match err {
        RhiError::VulkanError(result) => unrecoverable(operation, result),
        other => other,
    }
}

/// Classifies the raw result of `vkAcquireNextImageKHR`.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(result) => Err(unrecoverable("image acquire", result)),
    }
}

/// Classifies the raw result of `vkQueuePresentKHR`.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(result) => Err(unrecoverable("present", result)),
    }
}

/// The GPU side of a frame.
///
/// Every method runs on the render thread, in the order the driver calls
/// them. Errors returned from any step end the frame and are passed to the
/// caller unchanged.
pub trait FrameTarget {
    /// Number of pre-allocated command buffers (one per swapchain image).
    fn frame_count(&self) -> usize;

    /// Prepares what the frame draws and writes its uniform buffers.
    fn prepare(&mut self) -> RhiResult<()>;

    /// Acquires the next presentable image.
    fn acquire(&mut self) -> RhiResult<AcquireOutcome>;

    /// Records the command buffer for `frame_index` targeting `image_index`.
    fn record(&mut self, frame_index: usize, image_index: u32) -> RhiResult<()>;

    /// Submits the recorded buffer to the graphics queue.
    fn submit(&mut self, frame_index: usize) -> RhiResult<()>;

    /// Presents `image_index` and waits for the presentation queue.
    fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Tears down and recreates every swapchain-dependent resource.
    fn rebuild(&mut self) -> RhiResult<RebuildOutcome>;
}

/// Counters kept by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub rebuilds: u64,
    pub deferred: u64,
}

/// Drives frames through a [`FrameTarget`].
#[derive(Debug, Default)]
pub struct FrameDriver {
    state: FrameState,
    frame_index: usize,
    stats: FrameStats,
}

impl FrameDriver {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Index of the command buffer the next frame records into.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Requests a rebuild before the next frame, e.g. after a resize.
    pub fn mark_stale(&mut self) {
        if self.state != FrameState::Stale {
            debug!("Swapchain marked stale");
        }
        self.state = FrameState::Stale;
    }

    /// Runs one frame.
    ///
    /// A pending rebuild runs first. An out-of-date acquire aborts the
    /// frame before anything is submitted and rebuilds immediately; a
    /// stale present rebuilds after the frame.
    ///
    /// # Errors
    ///
    /// Any error from the target, including [`RhiError::Unrecoverable`].
    /// The state is left untouched so the caller can stop cleanly.
    pub fn draw<T: FrameTarget + ?Sized>(&mut self, target: &mut T) -> RhiResult<FrameStatus> {
        if self.state == FrameState::Stale
            && self.rebuild(target)? == RebuildOutcome::Deferred
        {
            return Ok(FrameStatus::Deferred);
        }

        target.prepare()?;

        let image_index = match target.acquire()? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    trace!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                info!("Swapchain out of date on acquire, rebuilding");
                self.state = FrameState::Stale;
                return self.rebuild_status(target);
            }
        };

        target.record(self.frame_index, image_index)?;
        target.submit(self.frame_index)?;
        let outcome = target.present(image_index)?;

        if outcome.was_presented() {
            self.stats.presented += 1;
        }
        self.frame_index = (self.frame_index + 1) % target.frame_count().max(1);

        if outcome.needs_rebuild() {
            info!("Present reported {:?}, rebuilding", outcome);
            self.state = FrameState::Stale;
            return self.rebuild_status(target);
        }

        Ok(FrameStatus::Presented)
    }

    fn rebuild_status<T: FrameTarget + ?Sized>(&mut self, target: &mut T) -> RhiResult<FrameStatus> {
        Ok(match self.rebuild(target)? {
            RebuildOutcome::Rebuilt => FrameStatus::Rebuilt,
            RebuildOutcome::Deferred => FrameStatus::Deferred,
        })
    }

    fn rebuild<T: FrameTarget + ?Sized>(&mut self, target: &mut T) -> RhiResult<RebuildOutcome> {
        let outcome = target.rebuild()?;
        match outcome {
            RebuildOutcome::Rebuilt => {
                self.state = FrameState::Ready;
                self.frame_index = 0;
                self.stats.rebuilds += 1;
            }
            RebuildOutcome::Deferred => {
                if self.stats.deferred == 0 || self.state == FrameState::Ready {
                    debug!("Rebuild deferred: drawable area is empty");
                }
                self.state = FrameState::Stale;
                self.stats.deferred += 1;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Prepare,
        Acquire,
        Record(usize, u32),
        Submit(usize),
        Present(u32),
        Rebuild,
    }

    /// Replays scripted acquire, present and rebuild results.
    struct ScriptedTarget {
        frames: usize,
        calls: Vec<Call>,
        acquires: VecDeque<RhiResult<AcquireOutcome>>,
        presents: VecDeque<RhiResult<PresentOutcome>>,
        rebuilds: VecDeque<RebuildOutcome>,
        next_image: u32,
    }

    impl ScriptedTarget {
        fn new(frames: usize) -> Self {
            Self {
                frames,
                calls: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                rebuilds: VecDeque::new(),
                next_image: 0,
            }
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }

        fn submitted(&self) -> bool {
            self.calls.iter().any(|c| matches!(c, Call::Submit(_)))
        }
    }

    impl FrameTarget for ScriptedTarget {
        fn frame_count(&self) -> usize {
            self.frames
        }

        fn prepare(&mut self) -> RhiResult<()> {
            self.calls.push(Call::Prepare);
            Ok(())
        }

        fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
            self.calls.push(Call::Acquire);
            self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.frames as u32;
                Ok(AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                })
            })
        }

        fn record(&mut self, frame_index: usize, image_index: u32) -> RhiResult<()> {
            self.calls.push(Call::Record(frame_index, image_index));
            Ok(())
        }

        fn submit(&mut self, frame_index: usize) -> RhiResult<()> {
            self.calls.push(Call::Submit(frame_index));
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome> {
            self.calls.push(Call::Present(image_index));
            self.presents
                .pop_front()
                .unwrap_or(Ok(PresentOutcome::Presented))
        }

        fn rebuild(&mut self) -> RhiResult<RebuildOutcome> {
            self.calls.push(Call::Rebuild);
            Ok(self.rebuilds.pop_front().unwrap_or(RebuildOutcome::Rebuilt))
        }
    }

    #[test]
    fn test_steady_state_sequence() {
        let mut target = ScriptedTarget::new(3);
        let mut driver = FrameDriver::new();

        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(
            target.calls,
            vec![
                Call::Prepare,
                Call::Acquire,
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0),
            ]
        );
        assert_eq!(driver.stats().presented, 1);
        assert_eq!(driver.state(), FrameState::Ready);
    }

    #[test]
    fn test_frame_index_wraps_at_frame_count() {
        let mut target = ScriptedTarget::new(2);
        let mut driver = FrameDriver::new();

        let indices: Vec<usize> = (0..5)
            .map(|_| {
                let index = driver.frame_index();
                driver.draw(&mut target).unwrap();
                index
            })
            .collect();

        assert_eq!(indices, vec![0, 1, 0, 1, 0]);
        assert_eq!(driver.stats().presented, 5);
    }

    #[test]
    fn test_out_of_date_acquire_skips_submit_and_rebuilds() {
        let mut target = ScriptedTarget::new(3);
        target.acquires.push_back(Ok(AcquireOutcome::OutOfDate));
        let mut driver = FrameDriver::new();

        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Rebuilt);
        assert!(!target.submitted());
        assert_eq!(target.count(&Call::Present(0)), 0);
        assert_eq!(target.calls.last(), Some(&Call::Rebuild));
        assert_eq!(driver.stats().rebuilds, 1);
        assert_eq!(driver.stats().presented, 0);

        // The next frame draws normally on the rebuilt chain.
        target.calls.clear();
        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(target.count(&Call::Rebuild), 0);
        assert!(target.submitted());
    }

    #[test]
    fn test_suboptimal_acquire_still_draws() {
        let mut target = ScriptedTarget::new(3);
        target.acquires.push_back(Ok(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: true,
        }));
        let mut driver = FrameDriver::new();

        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(target.count(&Call::Present(2)), 1);
        assert_eq!(target.count(&Call::Rebuild), 0);
    }

    #[test]
    fn test_suboptimal_present_rebuilds_after_presenting() {
        let mut target = ScriptedTarget::new(3);
        target.presents.push_back(Ok(PresentOutcome::Suboptimal));
        let mut driver = FrameDriver::new();

        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Rebuilt);
        assert_eq!(target.calls.last(), Some(&Call::Rebuild));
        assert_eq!(driver.stats().presented, 1);
        assert_eq!(driver.stats().rebuilds, 1);
        assert_eq!(driver.frame_index(), 0);
    }

    #[test]
    fn test_out_of_date_present_is_not_counted() {
        let mut target = ScriptedTarget::new(3);
        target.presents.push_back(Ok(PresentOutcome::OutOfDate));
        let mut driver = FrameDriver::new();

        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Rebuilt);
        assert_eq!(driver.stats().presented, 0);
        assert_eq!(driver.state(), FrameState::Ready);
    }

    #[test]
    fn test_deferred_rebuild_retries_each_frame() {
        let mut target = ScriptedTarget::new(3);
        target.acquires.push_back(Ok(AcquireOutcome::OutOfDate));
        target.rebuilds.push_back(RebuildOutcome::Deferred);
        target.rebuilds.push_back(RebuildOutcome::Deferred);
        let mut driver = FrameDriver::new();

        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Deferred);
        assert_eq!(driver.state(), FrameState::Stale);

        // Still minimised: only the rebuild is attempted.
        target.calls.clear();
        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Deferred);
        assert_eq!(target.calls, vec![Call::Rebuild]);

        // Restored: rebuild first, then a full frame.
        target.calls.clear();
        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(target.calls.first(), Some(&Call::Rebuild));
        assert!(target.submitted());
        assert_eq!(driver.stats().deferred, 2);
        assert_eq!(driver.stats().rebuilds, 1);
    }

    #[test]
    fn test_mark_stale_rebuilds_before_acquire() {
        let mut target = ScriptedTarget::new(3);
        let mut driver = FrameDriver::new();
        driver.mark_stale();

        assert_eq!(driver.draw(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(target.calls[0], Call::Rebuild);
        assert_eq!(target.calls[1], Call::Prepare);
    }

    #[test]
    fn test_unrecoverable_acquire_propagates() {
        let mut target = ScriptedTarget::new(3);
        target
            .acquires
            .push_back(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)));
        let mut driver = FrameDriver::new();

        let err = driver.draw(&mut target).unwrap_err();
        assert!(err.is_unrecoverable());
        assert!(!target.submitted());
        assert_eq!(target.count(&Call::Rebuild), 0);
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((1, false))).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 1,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(classify_acquire(Err(vk::Result::TIMEOUT)).is_err());
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::SUBOPTIMAL_KHR)).unwrap(),
            PresentOutcome::Suboptimal
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        match classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)) {
            Err(RhiError::Unrecoverable { operation, result }) => {
                assert_eq!(operation, "present");
                assert_eq!(result, vk::Result::ERROR_SURFACE_LOST_KHR);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_escalate_only_wraps_vulkan_errors() {
        let err = escalate("queue submit", RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST));
        assert!(err.is_unrecoverable());
        let err = escalate("queue submit", RhiError::NoSuitableAdapter);
        assert!(!err.is_unrecoverable());
    }
}
