//! Poison-tolerant guards for the std locks that protect in-memory registries.
//! Poisoned guards are recovered and logged.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, owner: &'static str) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), owner, "rwlock.read")
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, owner: &'static str) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), owner, "rwlock.write")
}

pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, owner: &'static str) -> MutexGuard<'a, T> {
    recover(mutex.lock(), owner, "mutex.lock")
}

fn recover<G>(result: LockResult<G>, owner: &'static str, lock_kind: &'static str) -> G {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                target = "docmirror::lock",
                owner,
                lock_kind,
                result = "poisoned_recovered",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_rwlock_is_recovered() {
        let lock = RwLock::new(1_u32);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("lock should be acquired");
            panic!("poison the lock");
        }));

        *write(&lock, "test") += 1;
        assert_eq!(*read(&lock, "test"), 2);
    }

    #[test]
    fn poisoned_mutex_is_recovered() {
        let mutex = Mutex::new(Vec::<u8>::new());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = mutex.lock().expect("mutex should be acquired");
            panic!("poison the mutex");
        }));

        lock(&mutex, "test").push(7);
        assert_eq!(lock(&mutex, "test").as_slice(), &[7]);
    }
}
