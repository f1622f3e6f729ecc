use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hue::legacy_api::Whitelist;

use crate::error::ApiResult;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub devicetype: String,
    pub clientkey: String,
    pub create_date: DateTime<Utc>,
    pub last_use_date: DateTime<Utc>,
}

/// Registered api users (the bridge whitelist), keyed by username.
///
/// Users are kept in memory, and written to `file` when one is configured.
/// Usage dates are only saved together with new registrations.
#[derive(Debug, Default)]
pub struct Users {
    users: BTreeMap<String, User>,
    file: Option<Utf8PathBuf>,
}

impl Users {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: &Utf8Path) -> ApiResult<Self> {
        let users = if path.is_file() {
            log::debug!("Loading api users from [{path}]");
            let users: BTreeMap<String, User> = serde_yml::from_reader(File::open(path)?)?;
            log::info!("Loaded {} api users", users.len());
            users
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            users,
            file: Some(path.to_path_buf()),
        })
    }

    fn save(&self) -> ApiResult<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };

        let tmp = path.with_extension("tmp");
        serde_yml::to_writer(File::create(&tmp)?, &self.users)?;
        fs::rename(&tmp, path)?;
        log::debug!("Saved {} api users to [{path}]", self.users.len());
        Ok(())
    }

    /// Register `devicetype` (`<application>#<device>`), returning username
    /// and client key. A devicetype that is already registered gets its
    /// existing credentials back.
    pub fn register(&mut self, devicetype: &str) -> (String, String) {
        if let Some((username, user)) = self
            .users
            .iter()
            .find(|(_, user)| user.devicetype == devicetype)
        {
            log::info!("Api user {username} already registered for [{devicetype}]");
            return (username.clone(), user.clientkey.clone());
        }

        let username = hex::encode(rand::random::<[u8; 20]>());
        let clientkey = hex::encode_upper(rand::random::<[u8; 16]>());
        let now = Utc::now();

        self.users.insert(
            username.clone(),
            User {
                devicetype: devicetype.to_string(),
                clientkey: clientkey.clone(),
                create_date: now,
                last_use_date: now,
            },
        );
        log::info!("Created api user {username} for [{devicetype}]");

        if let Err(err) = self.save() {
            log::warn!("Failed to save api users: {err}");
        }

        (username, clientkey)
    }

    /// True if `username` is registered. Updates its last use date.
    pub fn touch(&mut self, username: &str) -> bool {
        match self.users.get_mut(username) {
            Some(user) => {
                user.last_use_date = Utc::now();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn whitelist(&self) -> HashMap<String, Whitelist> {
        self.users
            .iter()
            .map(|(username, user)| {
                (
                    username.clone(),
                    Whitelist {
                        create_date: user.create_date,
                        last_use_date: user.last_use_date,
                        name: user.devicetype.clone(),
                    },
                )
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
