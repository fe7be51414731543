//! Microtasks and virtual timers.

use std::rc::Rc;

use crate::builtins::promise;
use crate::value::{ObjRef, Reaction, Value};

use super::{Abrupt, Interp};

/// Outcome a promise settled with.
#[derive(Clone)]
pub(crate) enum Settled {
    Fulfilled(Value),
    Rejected(Value),
}

/// A queued microtask.
pub(crate) enum Job {
    /// Run a `then` handler for a settled promise
    Reaction { reaction: Reaction, outcome: Settled },
    /// Adopt the state of a foreign thenable
    Thenable { promise: ObjRef, thenable: Value, then: Value },
}

/// What a timer runs when it fires.
#[derive(Clone)]
pub(crate) enum TimerCallback {
    Script { func: Value, args: Vec<Value> },
    Native(Rc<dyn Fn(&mut Interp) -> Result<(), Abrupt>>),
}

/// A pending `setTimeout`/`setInterval` or animation step.
#[derive(Clone)]
pub(crate) struct Timer {
    pub callback: TimerCallback,
    pub interval: Option<u64>,
}

impl Interp {
    pub(crate) fn enqueue(&mut self, job: Job) {
        self.microtasks.push_back(job);
    }

    /// Run queued microtasks until the queue is empty.
    pub fn drain_microtasks(&mut self) -> Result<(), Abrupt> {
        while let Some(job) = self.microtasks.pop_front() {
            self.tick()?;
            promise::run_job(self, job)?;
        }
        Ok(())
    }

    /// Schedule a timer `delay` virtual milliseconds from now.
    pub(crate) fn schedule(&mut self, delay: u64, callback: TimerCallback, interval: Option<u64>) -> u64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let due = self.now.saturating_add(delay);
        self.timers.insert((due, id), Timer { callback, interval });
        id
    }

    pub(crate) fn cancel_timer(&mut self, id: u64) {
        self.timers.retain(|(_, timer_id), _| *timer_id != id);
    }

    /// Drop every pending timer and microtask.
    pub fn clear_pending(&mut self) {
        self.timers.clear();
        self.microtasks.clear();
    }

    /// Whether any timer is still scheduled.
    pub fn has_pending_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Fire the earliest timer due at or before `limit`.
    fn fire_next(&mut self, limit: u64) -> Result<bool, Abrupt> {
        let Some((&(due, id), _)) = self.timers.iter().next() else {
            return Ok(false);
        };
        if due > limit {
            return Ok(false);
        }
        let Some(timer) = self.timers.remove(&(due, id)) else {
            return Ok(false);
        };
        self.now = self.now.max(due);
        if let Some(interval) = timer.interval {
            self.timers.insert((self.now + interval.max(1), id), timer.clone());
        }

        match timer.callback {
            TimerCallback::Script { func, args } => {
                self.call(&func, &Value::Undefined, &args)?;
            }
            TimerCallback::Native(func) => func(self)?,
        }
        self.drain_microtasks()?;
        Ok(true)
    }

    /// Advance the virtual clock, firing due timers in order.
    ///
    /// Each fired timer is its own entry with a fresh step budget.
    pub fn advance_time(&mut self, ms: u64) -> Result<(), Abrupt> {
        let target = self.now.saturating_add(ms);
        loop {
            self.begin_entry();
            if !self.fire_next(target)? {
                break;
            }
        }
        self.now = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxLimits;
    use std::cell::RefCell;

    #[test]
    fn timers_fire_in_due_order() {
        let mut interp = Interp::new(SandboxLimits::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        for (delay, label) in [(30, "c"), (10, "a"), (20, "b")] {
            let log = log.clone();
            interp.schedule(
                delay,
                TimerCallback::Native(Rc::new(move |_: &mut Interp| {
                    log.borrow_mut().push(label);
                    Ok(())
                })),
                None,
            );
        }
        interp.advance_time(25).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(interp.now(), 25);
        interp.advance_time(10).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn intervals_repeat_until_cancelled() {
        let mut interp = Interp::new(SandboxLimits::default());
        let count = Rc::new(RefCell::new(0));
        let counter = count.clone();
        let id = interp.schedule(
            10,
            TimerCallback::Native(Rc::new(move |_: &mut Interp| {
                *counter.borrow_mut() += 1;
                Ok(())
            })),
            Some(10),
        );
        interp.advance_time(35).unwrap();
        assert_eq!(*count.borrow(), 3);
        interp.cancel_timer(id);
        interp.advance_time(100).unwrap();
        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn timer_settled_promises_wait_for_the_clock() {
        let mut interp = Interp::new(SandboxLimits::default());
        let pending = promise::new_promise();
        let target = pending.clone();
        interp.schedule(
            500,
            TimerCallback::Native(Rc::new(move |interp: &mut Interp| {
                promise::resolve(interp, &target, Value::from("done"))
            })),
            None,
        );
        interp.drain_microtasks().unwrap();
        assert!(promise::state_of(&pending).is_none());
        assert_eq!(interp.now(), 0);

        interp.advance_time(500).unwrap();
        let Some(Settled::Fulfilled(value)) = promise::state_of(&pending) else {
            panic!("promise did not fulfil");
        };
        assert_eq!(&*value.to_js_string(), "done");
    }
}
