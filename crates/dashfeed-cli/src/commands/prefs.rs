use dashfeed_core::{PreferenceEntry, PreferenceKey};
use serde::Serialize;
use serde_json::json;

use crate::cli::{PrefsArgs, PrefsCommand};
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct PreferencesResponseData {
    preferences: Vec<PreferenceEntry>,
}

pub fn run(args: &PrefsArgs, context: &Context) -> Result<CommandResult, CliError> {
    let prefs = &context.prefs;

    let data = match &args.command {
        PrefsCommand::List => {
            let preferences = prefs
                .entries()?
                .into_iter()
                .map(|entry| PreferenceEntry {
                    value: display_value(entry.key, entry.value),
                    key: entry.key,
                })
                .collect();
            serde_json::to_value(PreferencesResponseData { preferences })?
        }
        PrefsCommand::Get { key } => {
            let key = key.parse::<PreferenceKey>()?;
            let value = prefs.get(key)?.map(|value| display_value(key, value));
            json!({ "key": key, "value": value })
        }
        PrefsCommand::Set { key, value } => {
            let key = key.parse::<PreferenceKey>()?;
            let stored = prefs.set(key, value)?;
            json!({ "key": key, "value": display_value(key, stored) })
        }
        PrefsCommand::Unset { key } => {
            let key = key.parse::<PreferenceKey>()?;
            let removed = prefs.remove(key)?;
            json!({ "key": key, "removed": removed })
        }
    };

    Ok(CommandResult::ok(data).with_source_chain(vec![String::from("store")]))
}

fn display_value(key: PreferenceKey, value: String) -> String {
    if key.is_secret() {
        let tail = value
            .char_indices()
            .rev()
            .nth(3)
            .map_or(value.as_str(), |(index, _)| &value[index..]);
        format!("****{tail}")
    } else {
        value
    }
}
