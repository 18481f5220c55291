//! Active expiration, driven by the server cron.

use crate::{server::server_read, util::{get_time_ms, log, LogLevel}};

const TIME_LIMIT_MS: u64 = 1000;

/// Scan the expires table while expiring keys are a large share of the
/// keyspace, deleting every entry whose deadline passed. The wall clock is
/// checked every 16 iterations and the cycle stops after spending its
/// millisecond budget.
pub fn active_expire_cycle() {
    let db = { server_read().db() };
    let start = get_time_ms();
    let mut iteration = 0u64;
    let mut timeout = false;

    while !timeout {
        let mut d = db.write().unwrap();
        if d.expired_percentage() <= 0.5 {
            break;
        }
        let now = get_time_ms();
        let mut expired: Vec<String> = Vec::new();
        d.scan_expires(|key, when| {
            if *when <= now {
                expired.push(key.clone());
            }
        });
        for key in &expired {
            if d.delete_key(key) {
                log(LogLevel::Debug, &format!("active expire cycle: key deleted {}", key));
            }
        }
        drop(d);

        iteration += 1;
        if iteration & 0xf == 0 && get_time_ms() - start >= TIME_LIMIT_MS {
            timeout = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::RedisDb, obj::RedisObject, util::add_ms_to_now};
    use std::{thread::sleep, time::Duration};

    #[test]
    fn expired_keys_are_scanned_out() {
        // drive the scan callback directly against a private db, the same
        // way the cycle does against the server db
        let mut db = RedisDb::new();
        for i in 0..16 {
            db.set_key(&format!("k{}", i), RedisObject::create_string("v"), add_ms_to_now(20), 0);
        }
        assert!(db.expired_percentage() > 0.5);
        sleep(Duration::from_millis(50));

        while db.expires_size() > 0 {
            let now = get_time_ms();
            let mut expired: Vec<String> = Vec::new();
            db.scan_expires(|key, when| {
                if *when <= now {
                    expired.push(key.clone());
                }
            });
            for key in &expired {
                db.delete_key(key);
            }
        }
        assert_eq!(db.size(), 0);
    }
}
