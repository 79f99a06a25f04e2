use std::panic::{AssertUnwindSafe, catch_unwind};

use ralph_loop_model::Generation;

use crate::outcome::LoopOutcome;
use crate::state::IterationRecord;

pub(crate) type OnIterationStart = Box<dyn Fn(u32) + Send + Sync>;
pub(crate) type OnIterationEnd = Box<dyn Fn(u32, &Generation) + Send + Sync>;
pub(crate) type OnIterationFinish = Box<dyn Fn(&IterationRecord) + Send + Sync>;
pub(crate) type OnFinish = Box<dyn Fn(&LoopOutcome) + Send + Sync>;

/// Callbacks registered on a loop.
///
/// They never change control flow: a panicking callback is logged and
/// ignored.
#[derive(Default)]
pub(crate) struct Observers {
    pub(crate) on_iteration_start: Option<OnIterationStart>,
    pub(crate) on_iteration_end: Option<OnIterationEnd>,
    pub(crate) on_iteration_finish: Option<OnIterationFinish>,
    pub(crate) on_finish: Option<OnFinish>,
}

impl Observers {
    pub(crate) fn iteration_start(&self, iteration: u32) {
        if let Some(f) = &self.on_iteration_start {
            notify("on_iteration_start", || f(iteration));
        }
    }

    pub(crate) fn iteration_end(&self, iteration: u32, generation: &Generation) {
        if let Some(f) = &self.on_iteration_end {
            notify("on_iteration_end", || f(iteration, generation));
        }
    }

    pub(crate) fn iteration_finish(&self, record: &IterationRecord) {
        if let Some(f) = &self.on_iteration_finish {
            notify("on_iteration_finish", || f(record));
        }
    }

    pub(crate) fn finish(&self, outcome: &LoopOutcome) {
        if let Some(f) = &self.on_finish {
            notify("on_finish", || f(outcome));
        }
    }
}

fn notify(name: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("observer `{name}` panicked, ignoring it");
    }
}
