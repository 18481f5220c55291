//!
//! I/O multiplexing backends of the event loop.
//!

#[cfg(target_os = "linux")]
pub mod io_event {
    use std::mem::zeroed;
    use libc::{close, epoll_create, epoll_ctl, epoll_event, epoll_wait, strerror, EPOLLIN, EPOLLOUT, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD};
    use crate::{ae::{FiredEvent, Mask, SET_SIZE}, util::error};

    pub struct ApiState {
        epfd: i32,
        events: Vec<epoll_event>,
    }

    impl ApiState {
        pub fn create() -> Result<ApiState, String> {
            let mut _epfd = -1;
            let mut _err = String::new();
            unsafe {
                _epfd = epoll_create(1024); // 1024 is just a hint for the kernel
                _err = format!("{}", std::ffi::CStr::from_ptr(strerror(error())).to_string_lossy());
            }
            if _epfd == -1 {
                return Err(_err);
            }
            Ok(ApiState { epfd: _epfd, events: vec![epoll_event { events: 0, u64: 0 }; SET_SIZE] })
        }

        pub fn add_event(&self, fd: i32, old: Mask, mut mask: Mask) -> Result<(), String> {
            let mut ee: epoll_event;
            // If the fd was already monitored for some event, we need a MOD
            // operation. Otherwise we need an ADD operation.
            let op = if old.is_none() { EPOLL_CTL_ADD } else { EPOLL_CTL_MOD };

            unsafe {
                ee = zeroed();
                mask = mask | old; // Merge old events
                if mask.is_readable() {
                    ee.events |= EPOLLIN as u32;
                }
                if mask.is_writable() {
                    ee.events |= EPOLLOUT as u32;
                }
                ee.u64 = fd as u64;
                if epoll_ctl(self.epfd, op, fd, &mut ee) == -1 {
                    return Err(format!("ApiState.add_event: {}", std::ffi::CStr::from_ptr(strerror(error())).to_string_lossy()));
                }
            }

            Ok(())
        }

        pub fn del_event(&self, fd: i32, mut old: Mask, mask: Mask) -> Result<(), String> {
            let mut ee: epoll_event;
            old.disable(mask);

            unsafe {
                ee = zeroed();
                if old.is_readable() {
                    ee.events |= EPOLLIN as u32;
                }
                if old.is_writable() {
                    ee.events |= EPOLLOUT as u32;
                }
                ee.u64 = fd as u64;
                let ret_val = if old.is_none() || (!old.is_readable() && !old.is_writable()) {
                    // Note, kernel < 2.6.9 requires a non null event pointer
                    // even for EPOLL_CTL_DEL.
                    epoll_ctl(self.epfd, EPOLL_CTL_DEL, fd, &mut ee)
                } else {
                    epoll_ctl(self.epfd, EPOLL_CTL_MOD, fd, &mut ee)
                };
                if ret_val == -1 {
                    return Err(format!("ApiState.del_event: {}", std::ffi::CStr::from_ptr(strerror(error())).to_string_lossy()));
                }
            }

            Ok(())
        }

        pub fn poll(&mut self, fired: &mut Vec<FiredEvent>, timeout_ms: Option<u64>) -> i32 {
            let timeout = match timeout_ms {
                Some(ms) => ms as i32,
                None => -1,
            };
            let mut _ret_val = 0;
            unsafe {
                _ret_val = epoll_wait(self.epfd, &mut self.events[0], SET_SIZE as i32, timeout);
            }

            let mut num_events = 0;
            if _ret_val > 0 {
                num_events = _ret_val;
                for j in 0..num_events {
                    let mut mask = Mask::none();
                    let e = self.events[j as usize];

                    if (e.events & EPOLLIN as u32) != 0 {
                        mask = mask | Mask::readable();
                    }
                    if (e.events & EPOLLOUT as u32) != 0 {
                        mask = mask | Mask::writable();
                    }

                    fired[j as usize].fd = e.u64 as i32;
                    fired[j as usize].mask = mask;
                }
            }

            num_events
        }

        pub fn name() -> String {
            "epoll".to_string()
        }
    }

    impl Drop for ApiState {
        fn drop(&mut self) {
            let mut _ret_no = -1;
            unsafe {
                _ret_no = close(self.epfd);
            }
            if _ret_no == -1 {
                eprintln!("ApiState.drop failed");
            }
        }
    }
}

#[cfg(target_os = "macos")]
pub mod io_event {
    use std::ptr::{null, null_mut};
    use libc::{close, kevent, kqueue, strerror, timespec, EVFILT_READ, EVFILT_WRITE, EV_ADD, EV_DELETE};
    use crate::{ae::{FiredEvent, Mask, SET_SIZE}, util::error};

    pub struct ApiState {
        kqfd: i32,
        events: Vec<libc::kevent>,
    }

    impl ApiState {
        pub fn create() -> Result<ApiState, String> {
            let mut _kqfd = -1;
            let mut _err = String::new();
            unsafe {
                _kqfd = kqueue();
                _err = format!("{}", std::ffi::CStr::from_ptr(strerror(error())).to_string_lossy());
            }
            if _kqfd == -1 {
                return Err(_err);
            }
            let zero = libc::kevent {
                ident: 0,
                filter: 0,
                flags: 0,
                fflags: 0,
                data: 0,
                udata: null_mut(),
            };
            Ok(ApiState { kqfd: _kqfd, events: vec![zero; SET_SIZE] })
        }

        pub fn add_event(&self, fd: i32, _old: Mask, mask: Mask) -> Result<(), String> {
            if mask.is_readable() {
                self.register(fd, EVFILT_READ, EV_ADD)?;
            }
            if mask.is_writable() {
                self.register(fd, EVFILT_WRITE, EV_ADD)?;
            }
            Ok(())
        }

        pub fn del_event(&self, fd: i32, _old: Mask, mask: Mask) -> Result<(), String> {
            if mask.is_readable() {
                self.register(fd, EVFILT_READ, EV_DELETE)?;
            }
            if mask.is_writable() {
                self.register(fd, EVFILT_WRITE, EV_DELETE)?;
            }
            Ok(())
        }

        fn register(&self, fd: i32, filter: i16, flags: u16) -> Result<(), String> {
            let ke = libc::kevent {
                ident: fd as usize,
                filter,
                flags,
                fflags: 0,
                data: 0,
                udata: null_mut(),
            };
            unsafe {
                if kevent(self.kqfd, &ke, 1, null_mut(), 0, null()) == -1 {
                    return Err(format!("ApiState.register: {}", std::ffi::CStr::from_ptr(strerror(error())).to_string_lossy()));
                }
            }
            Ok(())
        }

        pub fn poll(&mut self, fired: &mut Vec<FiredEvent>, timeout_ms: Option<u64>) -> i32 {
            let mut ret_val;
            unsafe {
                if let Some(ms) = timeout_ms {
                    let timeout = timespec {
                        tv_sec: (ms / 1000) as i64,
                        tv_nsec: ((ms % 1000) * 1_000_000) as i64,
                    };
                    ret_val = kevent(self.kqfd, null(), 0, &mut self.events[0], SET_SIZE as i32, &timeout);
                } else {
                    ret_val = kevent(self.kqfd, null(), 0, &mut self.events[0], SET_SIZE as i32, null());
                }
            }

            let mut num_events = 0;
            if ret_val > 0 {
                num_events = ret_val;
                for j in 0..num_events {
                    let mut mask = Mask::none();
                    let e = &self.events[j as usize];

                    if e.filter == EVFILT_READ {
                        mask = mask | Mask::readable();
                    }
                    if e.filter == EVFILT_WRITE {
                        mask = mask | Mask::writable();
                    }

                    fired[j as usize].fd = e.ident as i32;
                    fired[j as usize].mask = mask;
                }
            }

            num_events
        }

        pub fn name() -> String {
            "kqueue".to_string()
        }
    }

    impl Drop for ApiState {
        fn drop(&mut self) {
            let mut _ret_no = -1;
            unsafe {
                _ret_no = close(self.kqfd);
            }
            if _ret_no == -1 {
                eprintln!("ApiState.drop failed");
            }
        }
    }
}
