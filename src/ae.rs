//! The event loop: a single-threaded cooperative reactor.
//!
//! File events are kept in an fd-indexed table, time events in a doubly
//! linked list. One pass of `process_events` polls the kernel readiness
//! handle with a one second timeout, dispatches at most one read and one
//! write callback per ready fd (write first when the slot carries the
//! barrier bit), then walks the time event list.

use std::{any::Any, ops::{BitAnd, BitOr, Deref}, process::exit, sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak}};
use once_cell::sync::Lazy;
use crate::{io_event::io_event::ApiState, util::{add_ms_to_now, get_time_ms, log, LogLevel}};

pub const SET_SIZE: usize = 1024 * 10; // Max number of fd supported
pub const NO_MORE: i64 = -1;
pub const DELETE_EVENT_ID: i64 = -1024;
const POLL_TIMEOUT_MS: u64 = 1000;

pub type FileProc = Arc<dyn Fn(i32, Mask) + Sync + Send>;
pub type TimeProc = Arc<dyn Fn(i64, Option<Arc<dyn Any + Sync + Send>>) -> i64 + Sync + Send>;
pub type EventFinalizerProc = Arc<dyn Fn(Option<Arc<dyn Any + Sync + Send>>) + Sync + Send>;
pub type BeforeSleepProc = Arc<dyn Fn() + Sync + Send>;

/// File event readiness mask. Barrier makes the write handler run before
/// the read handler within one dispatch.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Mask(u8);

impl Mask {
    pub fn none() -> Self {
        Mask(0)
    }

    pub fn readable() -> Self {
        Mask(1)
    }

    pub fn writable() -> Self {
        Mask(2)
    }

    pub fn barrier() -> Self {
        Mask(4)
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn is_readable(&self) -> bool {
        (self.0 & Self::readable().0) != 0
    }

    pub fn is_writable(&self) -> bool {
        (self.0 & Self::writable().0) != 0
    }

    pub fn is_barrier(&self) -> bool {
        (self.0 & Self::barrier().0) != 0
    }

    pub fn disable(&mut self, mask: Self) {
        self.0 &= !mask.0;
    }
}

impl BitOr for Mask {
    type Output = Mask;

    fn bitor(self, rhs: Self) -> Self::Output {
        Mask(self.0 | rhs.0)
    }
}

impl BitAnd for Mask {
    type Output = Mask;

    fn bitand(self, rhs: Self) -> Self::Output {
        Mask(self.0 & rhs.0)
    }
}

/// File event slot: mask plus the read/write callbacks.
#[derive(Clone)]
pub struct FileEvent {
    pub mask: Mask,
    pub r_file_proc: Option<FileProc>,
    pub w_file_proc: Option<FileProc>,
}

/// Registered events
///
/// fd -> FileEvent
pub static EVENTS: Lazy<RwLock<Vec<FileEvent>>> = Lazy::new(|| {
    let mut events: Vec<FileEvent> = Vec::with_capacity(SET_SIZE);
    for _ in 0..SET_SIZE {
        events.push(FileEvent { mask: Mask::none(), r_file_proc: None, w_file_proc: None });
    }
    RwLock::new(events)
});
pub fn events_read() -> RwLockReadGuard<'static, Vec<FileEvent>> {
    EVENTS.read().unwrap()
}
pub fn events_write() -> RwLockWriteGuard<'static, Vec<FileEvent>> {
    EVENTS.write().unwrap()
}

/// Time Event
pub struct TimeEvent {
    pub id: i64,
    pub when_ms: u64,
    pub time_proc: TimeProc,
    pub finalizer_proc: Option<EventFinalizerProc>,
    pub client_data: Option<Arc<dyn Any + Sync + Send>>,
    pub prev: Option<Weak<RwLock<TimeEvent>>>,
    pub next: Option<Arc<RwLock<TimeEvent>>>,
}
pub static TIME_EVENT_HEAD: Lazy<RwLock<Option<Arc<RwLock<TimeEvent>>>>> = Lazy::new(|| RwLock::new(None));
pub fn tevent_head_r() -> RwLockReadGuard<'static, Option<Arc<RwLock<TimeEvent>>>> {
    TIME_EVENT_HEAD.read().unwrap()
}
pub fn tevent_head_w() -> RwLockWriteGuard<'static, Option<Arc<RwLock<TimeEvent>>>> {
    TIME_EVENT_HEAD.write().unwrap()
}

/// Fired Event
#[derive(Clone, Copy)]
pub struct FiredEvent {
    pub fd: i32,
    pub mask: Mask,
}
pub static FIRED: Lazy<RwLock<Vec<FiredEvent>>> = Lazy::new(|| {
    let mut fired: Vec<FiredEvent> = Vec::with_capacity(SET_SIZE);
    for _ in 0..SET_SIZE {
        fired.push(FiredEvent { fd: -1, mask: Mask::none() });
    }
    RwLock::new(fired)
});

/// Polling API specific data
pub static API_DATA: Lazy<RwLock<ApiState>> = Lazy::new(|| {
    match ApiState::create() {
        Err(e) => {
            log(LogLevel::Warning, &e);
            exit(1);
        },
        Ok(d) => RwLock::new(d),
    }
});

pub static STOP: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

pub static BEFORE_SLEEP: Lazy<RwLock<Option<BeforeSleepProc>>> = Lazy::new(|| RwLock::new(None));
pub fn set_before_sleep_proc(before_sleep: Option<BeforeSleepProc>) {
    *BEFORE_SLEEP.write().unwrap() = before_sleep;
}

pub static MAX_FD: Lazy<RwLock<i32>> = Lazy::new(|| RwLock::new(-1));

pub static TIME_EVENT_NEXT_ID: Lazy<RwLock<i64>> = Lazy::new(|| RwLock::new(0));

pub fn ae_main() {
    *STOP.write().unwrap() = false;
    while !*STOP.read().unwrap() {
        let before_sleep = BEFORE_SLEEP.read().unwrap().clone();
        if let Some(f) = before_sleep {
            f();
        }
        process_events();
    }
}

pub fn stop() {
    *STOP.write().unwrap() = true;
}

/// One reactor pass: poll for up to a second, dispatch file events, then
/// the time events. Returns the number of events processed.
pub fn process_events() -> u32 {
    let mut processed = 0u32;

    let num_events = API_DATA.write().unwrap().poll(&mut FIRED.write().unwrap(), Some(POLL_TIMEOUT_MS));
    for j in 0..num_events {
        let (fd, mask) = {
            let fired = FIRED.read().unwrap();
            (fired[j as usize].fd, fired[j as usize].mask)
        };
        let fe = events_read()[fd as usize].clone();

        // note the fe.mask & mask check: an already processed event may have
        // removed an element that fired and we still didn't process, so we
        // check if the event is still valid.
        let invert = fe.mask.is_barrier();
        let rw_diff = match (&fe.r_file_proc, &fe.w_file_proc) {
            (Some(r), Some(w)) => !Arc::ptr_eq(r, w),
            _ => true,
        };
        let mut fired_once = false;
        if !invert && fe.mask.is_readable() && mask.is_readable() {
            if let Some(f) = fe.r_file_proc.clone() {
                f(fd, mask);
                fired_once = true;
            }
        }
        if fe.mask.is_writable() && mask.is_writable() && (!fired_once || rw_diff) {
            if let Some(f) = fe.w_file_proc.clone() {
                f(fd, mask);
                fired_once = true;
            }
        }
        if invert && fe.mask.is_readable() && mask.is_readable() && (!fired_once || rw_diff) {
            if let Some(f) = fe.r_file_proc.clone() {
                f(fd, mask);
            }
        }
        processed += 1;
    }

    processed + process_time_events()
}

pub fn process_time_events() -> u32 {
    let mut processed = 0u32;
    let mut te = tevent_head_r().clone();

    while let Some(e) = te {
        let id = e.deref().read().unwrap().id;
        if id == DELETE_EVENT_ID {
            let next = e.deref().read().unwrap().next.clone();
            unlink_time_event(&e);
            let finalizer = e.deref().read().unwrap().finalizer_proc.clone();
            if let Some(f) = finalizer {
                let data = e.deref().write().unwrap().client_data.take();
                f(data);
            }
            te = next;
            continue;
        }
        let when_ms = e.deref().read().unwrap().when_ms;
        if when_ms <= get_time_ms() {
            let client_data = e.deref().read().unwrap().client_data.clone();
            let f = e.deref().read().unwrap().time_proc.clone();
            let ret_val = f(id, client_data);
            processed += 1;
            if ret_val == NO_MORE {
                e.deref().write().unwrap().id = DELETE_EVENT_ID;
            } else {
                // callbacks return their next interval in seconds
                e.deref().write().unwrap().when_ms = add_ms_to_now((ret_val as u64) * 1000);
            }
        }
        te = e.deref().read().unwrap().next.clone();
    }
    processed
}

/// Register interest in fd readiness. An existing slot merges: masks are
/// or-ed together and a callback only lands in a slot that has none.
pub fn create_file_event(fd: i32, mask: Mask, proc: FileProc) -> Result<(), String> {
    if fd >= SET_SIZE as i32 {
        return Err(format!("fd should be less than {}", SET_SIZE));
    }
    let old_mask = events_read()[fd as usize].mask;
    API_DATA.read().unwrap().add_event(fd, old_mask, mask)?;
    {
        let mut events = events_write();
        let fe = &mut events[fd as usize];
        fe.mask = fe.mask | mask;
        if mask.is_readable() && fe.r_file_proc.is_none() {
            fe.r_file_proc = Some(proc.clone());
        }
        if mask.is_writable() && fe.w_file_proc.is_none() {
            fe.w_file_proc = Some(proc);
        }
    }
    if fd > *MAX_FD.read().unwrap() {
        *MAX_FD.write().unwrap() = fd;
    }

    Ok(())
}

/// Turn off mask bits for the fd; the slot is freed once no bits remain.
pub fn delete_file_event(fd: i32, mask: Mask) {
    if fd >= SET_SIZE as i32 {
        return;
    }

    let old = events_read()[fd as usize].mask;
    if old.is_none() {
        return;
    }
    {
        let mut events = events_write();
        let fe = &mut events[fd as usize];
        fe.mask.disable(mask);
        if mask.is_readable() {
            fe.r_file_proc = None;
        }
        if mask.is_writable() {
            fe.w_file_proc = None;
        }
        if fe.mask.is_none() || (!fe.mask.is_readable() && !fe.mask.is_writable()) {
            fe.mask = Mask::none();
            fe.r_file_proc = None;
            fe.w_file_proc = None;
        }
    }

    if fd == *MAX_FD.read().unwrap() && events_read()[fd as usize].mask.is_none() {
        let mut j = *MAX_FD.read().unwrap() - 1;
        while j >= 0 {
            if !events_read()[j as usize].mask.is_none() {
                break;
            }
            j -= 1;
        }
        *MAX_FD.write().unwrap() = j;
    }

    if let Err(err) = API_DATA.read().unwrap().del_event(fd, old, mask) {
        log(LogLevel::Verbose, &err);
    }
}

/// Create a periodic time event firing in `milliseconds`. New events are
/// pushed at the head of the list.
pub fn create_time_event(
    milliseconds: u64,
    proc: TimeProc,
    client_data: Option<Arc<dyn Any + Sync + Send>>,
    finalizer_proc: Option<EventFinalizerProc>,
) -> i64 {
    let id = {
        let mut next_id = TIME_EVENT_NEXT_ID.write().unwrap();
        let id = *next_id;
        *next_id += 1;
        id
    };
    let te = Arc::new(RwLock::new(TimeEvent {
        id,
        when_ms: add_ms_to_now(milliseconds),
        time_proc: proc,
        finalizer_proc,
        client_data,
        prev: None,
        next: tevent_head_w().take(),
    }));
    if let Some(ref old_head) = te.deref().read().unwrap().next {
        old_head.deref().write().unwrap().prev = Some(Arc::downgrade(&te));
    }
    *tevent_head_w() = Some(te);

    id
}

/// Mark the event for deletion; the next pass of the time event processor
/// unlinks it and runs the finalizer.
pub fn delete_time_event(id: i64) -> Result<(), String> {
    let mut te = tevent_head_r().clone();
    while let Some(e) = te {
        if e.deref().read().unwrap().id == id {
            e.deref().write().unwrap().id = DELETE_EVENT_ID;
            return Ok(());
        }
        te = e.deref().read().unwrap().next.clone();
    }
    Err(format!("NO event with the specified ID ({id}) found"))
}

fn unlink_time_event(e: &Arc<RwLock<TimeEvent>>) {
    let prev = e.deref().read().unwrap().prev.clone().and_then(|w| w.upgrade());
    let next = e.deref().read().unwrap().next.clone();
    match prev {
        Some(ref p) => {
            p.deref().write().unwrap().next = next.clone();
        },
        None => {
            *tevent_head_w() = next.clone();
        },
    }
    if let Some(ref n) = next {
        n.deref().write().unwrap().prev = e.deref().read().unwrap().prev.clone();
    }
    e.deref().write().unwrap().next = None;
    e.deref().write().unwrap().prev = None;
}

/// Block on a single fd with poll(2). Returns -1 on error, 0 on timeout,
/// a positive value when the fd is ready. Only for sync helpers, never
/// from inside a file event callback.
pub fn ae_wait(fd: i32, mask: Mask, timeout_ms: i64) -> i32 {
    let mut pfd = libc::pollfd { fd, events: 0, revents: 0 };
    if mask.is_readable() {
        pfd.events |= libc::POLLIN;
    }
    if mask.is_writable() {
        pfd.events |= libc::POLLOUT;
    }
    let r = unsafe { libc::poll(&mut pfd, 1, timeout_ms as i32) };
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_bits() {
        let mut mask = Mask::readable() | Mask::writable();
        assert!(mask.is_readable());
        assert!(mask.is_writable());
        assert!(!mask.is_barrier());

        mask.disable(Mask::readable());
        assert!(!mask.is_readable());
        assert!(mask.is_writable());

        mask.disable(Mask::none());
        assert!(mask.is_writable());

        mask.disable(Mask::writable());
        assert!(mask.is_none());

        let barrier = Mask::writable() | Mask::barrier();
        assert!(barrier.is_writable() && barrier.is_barrier() && !barrier.is_readable());
    }

    #[test]
    fn time_event_list_link_unlink() {
        let noop: TimeProc = Arc::new(|_, _| NO_MORE);
        let id1 = create_time_event(1000, noop.clone(), None, None);
        let id2 = create_time_event(1000, noop.clone(), None, None);
        let id3 = create_time_event(1000, noop, None, None);
        assert!(id1 < id2 && id2 < id3);

        // mark the middle one and let the processor unlink it
        assert!(delete_time_event(id2).is_ok());
        process_time_events();
        let mut seen = Vec::new();
        let mut te = tevent_head_r().clone();
        while let Some(e) = te {
            seen.push(e.deref().read().unwrap().id);
            te = e.deref().read().unwrap().next.clone();
        }
        assert!(!seen.contains(&id2));
        assert!(delete_time_event(id2).is_err());

        // cleanup so other tests see an empty list
        let _ = delete_time_event(id1);
        let _ = delete_time_event(id3);
        process_time_events();
    }
}
