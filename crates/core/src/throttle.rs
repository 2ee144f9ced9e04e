use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::QuotaError;
use crate::users::UserAccount;

pub const DEFAULT_NOTIFY_WINDOW: Duration = Duration::from_secs(604_800);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleDecision {
    Eligible,
    Cooldown,
    Refused,
}

/// Checking is destructive: an eligible answer already records the
/// notification, so two back-to-back checks answer eligible once.
pub trait NotificationClock {
    fn check_and_refresh(&self, account: &UserAccount) -> ThrottleDecision;
}

/// Last-notified time is the mtime of a sentinel file in the user's home.
#[derive(Debug, Clone)]
pub struct SentinelClock {
    sentinel_name: String,
    window: Duration,
    trusted_owner: Option<u32>,
}

impl SentinelClock {
    pub fn new(sentinel_name: impl Into<String>, window: Duration) -> Self {
        Self {
            sentinel_name: sentinel_name.into(),
            window,
            trusted_owner: None,
        }
    }

    pub fn with_trusted_owner(mut self, uid: u32) -> Self {
        self.trusted_owner = Some(uid);
        self
    }

    pub fn sentinel_path(&self, account: &UserAccount) -> PathBuf {
        account.home.join(&self.sentinel_name)
    }

    pub fn check_at(&self, account: &UserAccount, now: SystemTime) -> ThrottleDecision {
        let path = self.sentinel_path(account);
        match self.try_check(&path, now) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    "not notifying {}: sentinel {} unusable: {err}",
                    account.name,
                    path.display()
                );
                ThrottleDecision::Refused
            }
        }
    }

    fn try_check(&self, path: &Path, now: SystemTime) -> Result<ThrottleDecision, QuotaError> {
        let (file, created) = open_sentinel(path)?;
        // Held until `file` drops, so a concurrent run for the same user
        // sees either the old timestamp or the refreshed one.
        let file = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| QuotaError::io(path, io::Error::from(errno)))?;

        let metadata = file.metadata().map_err(|err| QuotaError::io(path, err))?;
        if !metadata.is_file() {
            return Err(QuotaError::PermissionDenied {
                detail: format!("{} is not a regular file", path.display()),
            });
        }
        if let Some(owner) = self.trusted_owner {
            if metadata.uid() != owner {
                return Err(QuotaError::PermissionDenied {
                    detail: format!(
                        "{} is owned by uid {}, expected {owner}",
                        path.display(),
                        metadata.uid()
                    ),
                });
            }
        }

        if created {
            debug!("created sentinel {}", path.display());
            file.set_modified(now)
                .map_err(|err| QuotaError::io(path, err))?;
            return Ok(ThrottleDecision::Eligible);
        }

        let last = metadata
            .modified()
            .map_err(|err| QuotaError::io(path, err))?;
        // A timestamp in the future counts as "just notified".
        let elapsed = now.duration_since(last).unwrap_or(Duration::ZERO);
        if elapsed < self.window {
            debug!(
                "{} last touched {} ({}s ago); cooling down",
                path.display(),
                DateTime::<Utc>::from(last).to_rfc3339_opts(SecondsFormat::Secs, true),
                elapsed.as_secs()
            );
            return Ok(ThrottleDecision::Cooldown);
        }

        file.set_modified(now)
            .map_err(|err| QuotaError::io(path, err))?;
        info!(
            "{} was {}s old; refreshed for notification",
            path.display(),
            elapsed.as_secs()
        );
        Ok(ThrottleDecision::Eligible)
    }
}

impl NotificationClock for SentinelClock {
    fn check_and_refresh(&self, account: &UserAccount) -> ThrottleDecision {
        self.check_at(account, SystemTime::now())
    }
}

// The flag reports whether this call created the file.
fn open_sentinel(path: &Path) -> Result<(File, bool), QuotaError> {
    let created = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path);
    match created {
        Ok(file) => Ok((file, true)),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NOFOLLOW)
            .open(path)
            .map(|file| (file, false))
            .map_err(|err| QuotaError::io(path, err)),
        Err(err) => Err(QuotaError::io(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    use super::{NotificationClock, SentinelClock, ThrottleDecision, DEFAULT_NOTIFY_WINDOW};
    use crate::users::UserAccount;

    fn account(temp: &TempDir) -> UserAccount {
        UserAccount {
            name: "alice".to_string(),
            uid: nix::unistd::geteuid().as_raw(),
            home: temp.path().to_path_buf(),
        }
    }

    fn clock() -> SentinelClock {
        SentinelClock::new(".quota", DEFAULT_NOTIFY_WINDOW)
            .with_trusted_owner(nix::unistd::geteuid().as_raw())
    }

    fn backdate(path: &std::path::Path, by: Duration) {
        let file = File::options().write(true).open(path).expect("open sentinel");
        file.set_modified(SystemTime::now() - by)
            .expect("set mtime");
    }

    #[test]
    fn first_check_is_eligible_then_cools_down_until_window_passes() {
        let temp = TempDir::new().expect("tempdir");
        let account = account(&temp);
        let clock = clock();

        assert_eq!(clock.check_and_refresh(&account), ThrottleDecision::Eligible);
        assert_eq!(clock.check_and_refresh(&account), ThrottleDecision::Cooldown);

        backdate(&clock.sentinel_path(&account), Duration::from_secs(604_800));
        assert_eq!(clock.check_and_refresh(&account), ThrottleDecision::Eligible);
        assert_eq!(clock.check_and_refresh(&account), ThrottleDecision::Cooldown);
    }

    #[test]
    fn sentinel_is_private_to_owner() {
        let temp = TempDir::new().expect("tempdir");
        let account = account(&temp);
        let clock = clock();
        clock.check_and_refresh(&account);

        let mode = fs::metadata(clock.sentinel_path(&account))
            .expect("sentinel exists")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn cooldown_does_not_move_the_clock() {
        let temp = TempDir::new().expect("tempdir");
        let account = account(&temp);
        let clock = clock();
        clock.check_and_refresh(&account);

        let path = clock.sentinel_path(&account);
        backdate(&path, Duration::from_secs(3 * 86_400));
        let before = fs::metadata(&path).and_then(|m| m.modified()).expect("mtime");
        assert_eq!(clock.check_and_refresh(&account), ThrottleDecision::Cooldown);
        let after = fs::metadata(&path).and_then(|m| m.modified()).expect("mtime");
        assert_eq!(before, after);
    }

    #[test]
    fn untrusted_owner_fails_closed() {
        let temp = TempDir::new().expect("tempdir");
        let account = account(&temp);
        let foreign = SentinelClock::new(".quota", DEFAULT_NOTIFY_WINDOW)
            .with_trusted_owner(nix::unistd::geteuid().as_raw().wrapping_add(1));

        assert_eq!(foreign.check_and_refresh(&account), ThrottleDecision::Refused);
        backdate(&foreign.sentinel_path(&account), Duration::from_secs(30 * 86_400));
        assert_eq!(foreign.check_and_refresh(&account), ThrottleDecision::Refused);
    }

    #[test]
    fn symlinked_sentinel_is_refused() {
        let temp = TempDir::new().expect("tempdir");
        let account = account(&temp);
        let target = temp.path().join("elsewhere");
        fs::write(&target, b"").expect("write target");
        std::os::unix::fs::symlink(&target, temp.path().join(".quota")).expect("symlink");

        assert_eq!(clock().check_and_refresh(&account), ThrottleDecision::Refused);
    }

    #[test]
    fn missing_home_fails_closed() {
        let temp = TempDir::new().expect("tempdir");
        let mut account = account(&temp);
        account.home = temp.path().join("gone");
        assert_eq!(clock().check_and_refresh(&account), ThrottleDecision::Refused);
    }

    #[test]
    fn concurrent_checks_on_fresh_sentinel_admit_exactly_one() {
        const RUNS: usize = 8;

        for _ in 0..20 {
            let temp = TempDir::new().expect("tempdir");
            let account = account(&temp);
            let clock = clock();
            let start = Barrier::new(RUNS);

            let decisions: Vec<ThrottleDecision> = thread::scope(|scope| {
                let handles: Vec<_> = (0..RUNS)
                    .map(|_| {
                        scope.spawn(|| {
                            start.wait();
                            clock.check_and_refresh(&account)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().expect("check thread"))
                    .collect()
            });

            let eligible = decisions
                .iter()
                .filter(|decision| **decision == ThrottleDecision::Eligible)
                .count();
            assert_eq!(eligible, 1, "decisions: {decisions:?}");
            assert!(decisions
                .iter()
                .all(|decision| *decision != ThrottleDecision::Refused));
        }
    }
}
