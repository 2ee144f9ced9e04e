use std::collections::HashMap;
use std::ffi::CStr;
use std::path::PathBuf;

use nix::unistd::{geteuid, Uid, User};

use crate::error::QuotaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub name: String,
    pub uid: u32,
    pub home: PathBuf,
}

impl From<User> for UserAccount {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            home: user.dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaSubject {
    pub identity: String,
    pub uid: Option<u32>,
}

impl QuotaSubject {
    pub fn named(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let uid = identity.parse::<u32>().ok();
        Self { identity, uid }
    }
}

impl From<&UserAccount> for QuotaSubject {
    fn from(account: &UserAccount) -> Self {
        Self {
            identity: account.name.clone(),
            uid: Some(account.uid),
        }
    }
}

pub trait AccountDirectory {
    fn lookup(&self, user: &str) -> Result<UserAccount, QuotaError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAccounts;

impl AccountDirectory for SystemAccounts {
    fn lookup(&self, user: &str) -> Result<UserAccount, QuotaError> {
        let found = if !user.is_empty() && user.chars().all(|c| c.is_ascii_digit()) {
            user.parse::<u32>()
                .ok()
                .and_then(|uid| User::from_uid(Uid::from_raw(uid)).ok().flatten())
        } else {
            User::from_name(user).ok().flatten()
        };
        found.map(UserAccount::from).ok_or_else(|| QuotaError::UnknownUser {
            user: user.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    accounts: HashMap<String, UserAccount>,
}

impl StaticAccounts {
    pub fn new(accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|account| (account.name.clone(), account))
                .collect(),
        }
    }
}

impl AccountDirectory for StaticAccounts {
    fn lookup(&self, user: &str) -> Result<UserAccount, QuotaError> {
        self.accounts
            .get(user)
            .cloned()
            .ok_or_else(|| QuotaError::UnknownUser {
                user: user.to_string(),
            })
    }
}

pub fn current_account() -> Result<UserAccount, QuotaError> {
    let uid = geteuid();
    User::from_uid(uid)
        .ok()
        .flatten()
        .map(UserAccount::from)
        .ok_or_else(|| QuotaError::UnknownUser {
            user: uid.to_string(),
        })
}

pub fn running_as_root() -> bool {
    geteuid().is_root()
}

pub fn accounts_above(min_uid: u32) -> Vec<UserAccount> {
    let mut accounts = Vec::new();
    // getpwent keeps process-global cursor state; runs are single-threaded.
    unsafe {
        libc::setpwent();
        loop {
            let entry = libc::getpwent();
            if entry.is_null() {
                break;
            }
            let entry = &*entry;
            if entry.pw_uid <= min_uid {
                continue;
            }
            accounts.push(UserAccount {
                name: CStr::from_ptr(entry.pw_name).to_string_lossy().into_owned(),
                uid: entry.pw_uid,
                home: PathBuf::from(
                    CStr::from_ptr(entry.pw_dir).to_string_lossy().into_owned(),
                ),
            });
        }
        libc::endpwent();
    }
    accounts
}
