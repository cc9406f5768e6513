use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone)]
pub enum PerfSection {
    OperatorApply,
    InnerSolve,
    ExtendCrop,
    VectorKernels,
    Other,
}

#[derive(Debug, Default, Clone)]
pub struct PerfTimers {
    pub operator_apply: Duration,
    pub inner_solve: Duration,
    pub extend_crop: Duration,
    pub vector_kernels: Duration,
    pub other: Duration,
}

impl PerfTimers {
    pub fn scoped(&mut self, section: PerfSection) -> PerfGuard<'_> {
        PerfGuard { section, start: Instant::now(), timers: self }
    }

    pub fn add(&mut self, section: PerfSection, dt: Duration) {
        match section {
            PerfSection::OperatorApply => self.operator_apply += dt,
            PerfSection::InnerSolve => self.inner_solve += dt,
            PerfSection::ExtendCrop => self.extend_crop += dt,
            PerfSection::VectorKernels => self.vector_kernels += dt,
            PerfSection::Other => self.other += dt,
        }
    }
}

pub struct PerfGuard<'a> {
    section: PerfSection,
    start: Instant,
    timers: &'a mut PerfTimers,
}

impl Drop for PerfGuard<'_> {
    fn drop(&mut self) {
        self.timers.add(self.section, self.start.elapsed());
    }
}
