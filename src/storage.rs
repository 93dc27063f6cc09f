//! HTML5 local and session storage.
//!
//! Straight endpoint passthroughs, one family per storage area.

use serde_json::{json, Value as Json};

use crate::error::CmdError;
use crate::session::{string_value, Session};

macro_rules! storage_methods {
    ($prefix:literal, $area:literal, $keys:ident, $set:ident, $clear:ident, $get:ident, $delete:ident, $size:ident) => {
        #[doc = concat!("The keys present in ", $area, " storage.")]
        pub async fn $keys(&self) -> Result<Vec<String>, CmdError> {
            let value = self.server_get($prefix, &[]).await?;
            Ok(serde_json::from_value(value)?)
        }

        #[doc = concat!("Store a value in ", $area, " storage.")]
        pub async fn $set(&self, key: &str, value: &str) -> Result<(), CmdError> {
            self.server_post($prefix, Some(json!({ "key": key, "value": value })), &[])
                .await
                .map(drop)
        }

        #[doc = concat!("Remove everything from ", $area, " storage.")]
        pub async fn $clear(&self) -> Result<(), CmdError> {
            self.server_delete($prefix, &[]).await.map(drop)
        }

        #[doc = concat!("Read a value from ", $area, " storage.")]
        pub async fn $get(&self, key: &str) -> Result<Option<String>, CmdError> {
            let value = self.server_get(concat!($prefix, "/key/$0"), &[key]).await?;
            match value {
                Json::Null => Ok(None),
                value => Ok(Some(string_value(value)?)),
            }
        }

        #[doc = concat!("Remove a single key from ", $area, " storage.")]
        pub async fn $delete(&self, key: &str) -> Result<(), CmdError> {
            self.server_delete(concat!($prefix, "/key/$0"), &[key]).await.map(drop)
        }

        #[doc = concat!("The number of keys in ", $area, " storage.")]
        pub async fn $size(&self) -> Result<u64, CmdError> {
            let value = self.server_get(concat!($prefix, "/size"), &[]).await?;
            value
                .as_u64()
                .ok_or_else(|| CmdError::NotJson(value.to_string()))
        }
    };
}

impl Session {
    storage_methods!(
        "local_storage",
        "local",
        get_local_storage_keys,
        set_local_storage_item,
        clear_local_storage,
        get_local_storage_item,
        delete_local_storage_item,
        get_local_storage_length
    );

    storage_methods!(
        "session_storage",
        "session",
        get_session_storage_keys,
        set_session_storage_item,
        clear_session_storage,
        get_session_storage_item,
        delete_session_storage_item,
        get_session_storage_length
    );
}
