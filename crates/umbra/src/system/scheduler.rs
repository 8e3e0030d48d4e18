//! Timestamped event queue driving device timing.

use std::collections::VecDeque;

use crate::system::Event;

#[derive(Debug, Clone, Copy)]
pub struct ScheduledEvent {
    pub cycle: u64,
    pub event: Event,
}

/// Events ordered by deadline. Events with equal deadlines keep their insertion order.
///
/// A [`Event::Never`] sentinel sits at the very end of the queue at all times, so it is never
/// empty.
pub struct Scheduler {
    elapsed: u64,
    scheduled: VecDeque<ScheduledEvent>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("elapsed", &self.elapsed)
            .field("scheduled", &self.scheduled.len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        let mut scheduled = VecDeque::with_capacity(16);
        scheduled.push_back(ScheduledEvent {
            cycle: u64::MAX,
            event: Event::Never,
        });

        Self {
            elapsed: 0,
            scheduled,
        }
    }
}

impl Scheduler {
    /// Schedules `event` to happen at the absolute cycle `cycle`. A deadline in the past makes the
    /// event fire as soon as events are next processed.
    #[inline(always)]
    pub fn schedule_at(&mut self, event: Event, cycle: u64) {
        debug_assert!(event != Event::Never);

        let cycle = cycle.min(u64::MAX - 1);
        let index = self.scheduled.partition_point(|e| e.cycle <= cycle);
        self.scheduled.insert(index, ScheduledEvent { cycle, event });
    }

    /// Schedules `event` to happen `after` cycles from now.
    #[inline(always)]
    pub fn schedule(&mut self, event: Event, after: u64) {
        self.schedule_at(event, self.elapsed.saturating_add(after));
    }

    /// Removes the first pending occurrence of `event` and returns how many cycles it had left.
    pub fn cancel(&mut self, event: Event) -> Option<u64> {
        if event == Event::Never {
            return None;
        }

        let index = self.scheduled.iter().position(|e| e.event == event)?;
        let removed = self.scheduled.remove(index)?;
        Some(removed.cycle.saturating_sub(self.elapsed))
    }

    /// How many cycles until the first pending occurrence of `event`, if any.
    pub fn remaining(&self, event: Event) -> Option<u64> {
        self.scheduled
            .iter()
            .find(|e| e.event == event)
            .map(|e| e.cycle.saturating_sub(self.elapsed))
    }

    #[inline(always)]
    pub fn is_scheduled(&self, event: Event) -> bool {
        self.scheduled.iter().any(|e| e.event == event)
    }

    /// How many events are pending, not counting the sentinel.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.scheduled.len() - 1
    }

    #[inline(always)]
    pub fn advance(&mut self, count: u64) {
        self.elapsed += count;
    }

    /// How many cycles until the next event is due.
    #[inline(always)]
    pub fn until_next(&self) -> u64 {
        self.scheduled
            .front()
            .map_or(u64::MAX, |e| e.cycle.saturating_sub(self.elapsed))
    }

    /// Pops the next event if it is due.
    #[inline(always)]
    pub fn pop(&mut self) -> Option<Event> {
        self.scheduled
            .pop_front_if(|e| e.cycle <= self.elapsed)
            .map(|e| e.event)
    }

    /// How many CPU cycles have elapsed.
    #[inline(always)]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn drain(scheduler: &mut Scheduler) -> Vec<Event> {
        std::iter::from_fn(|| scheduler.pop()).collect()
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule_at(Event::ViLine, 5);
        scheduler.schedule_at(Event::PiDma, 3);
        scheduler.schedule_at(Event::SiDma, 3);
        scheduler.schedule_at(Event::AiDma, 10);

        assert_eq!(scheduler.until_next(), 3);

        scheduler.advance(3);
        assert_eq!(drain(&mut scheduler), [Event::PiDma, Event::SiDma]);

        scheduler.advance(2);
        assert_eq!(drain(&mut scheduler), [Event::ViLine]);

        scheduler.advance(4);
        assert!(drain(&mut scheduler).is_empty());
        assert_eq!(scheduler.until_next(), 1);

        scheduler.advance(1);
        assert_eq!(drain(&mut scheduler), [Event::AiDma]);
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn past_deadline_fires_next() {
        let mut scheduler = Scheduler::default();
        scheduler.advance(100);
        scheduler.schedule_at(Event::DpSync, 20);
        scheduler.schedule(Event::ViLine, 50);

        assert_eq!(scheduler.until_next(), 0);
        assert_eq!(drain(&mut scheduler), [Event::DpSync]);
    }

    #[test]
    fn cancel_returns_remaining() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(Event::PiDma, 40);
        scheduler.advance(15);

        assert_eq!(scheduler.remaining(Event::PiDma), Some(25));
        assert_eq!(scheduler.cancel(Event::PiDma), Some(25));
        assert_eq!(scheduler.cancel(Event::PiDma), None);
        assert!(!scheduler.is_scheduled(Event::PiDma));
    }

    #[test]
    fn sentinel_stays() {
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.cancel(Event::Never), None);
        assert_eq!(scheduler.until_next(), u64::MAX);
        assert!(scheduler.is_scheduled(Event::Never));
        assert_eq!(scheduler.pop(), None);
    }
}
