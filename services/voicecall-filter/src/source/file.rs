use std::{
    ffi::OsString,
    fs,
    path::PathBuf,
};

use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, error, info};

use super::{ChangeCallback, ListSource, SourceError, Subscription};
use crate::{config::FilterConfig, policy::ListKind};

/// Reads each list from `<settings_dir>/<key>.json` and watches the
/// directory for changes.
///
/// A missing file is an unset list. The file holds a JSON array of strings;
/// `null` is accepted as unset as well.
#[derive(Debug, Clone)]
pub struct FileListSource {
    settings_dir: PathBuf,
    hot_reload: bool,
}

impl FileListSource {
    pub fn new(settings_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings_dir: settings_dir.into(),
            hot_reload: true,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.settings_dir.clone()).with_hot_reload(config.enable_hot_reload)
    }

    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    pub fn list_path(&self, kind: ListKind) -> PathBuf {
        self.settings_dir.join(file_name(kind))
    }
}

impl ListSource for FileListSource {
    fn open(&self) -> Result<(), SourceError> {
        let metadata = fs::metadata(&self.settings_dir).map_err(|err| SourceError::Io {
            path: self.settings_dir.clone(),
            source: err,
        })?;

        if !metadata.is_dir() {
            return Err(SourceError::Unavailable(format!(
                "settings path '{}' is not a directory",
                self.settings_dir.display()
            )));
        }

        Ok(())
    }

    fn get_list(&self, kind: ListKind) -> Result<Option<Vec<String>>, SourceError> {
        let path = self.list_path(kind);
        if !path.exists() {
            debug!(list = %kind, path = %path.display(), "list file absent");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|err| SourceError::Io {
            path: path.clone(),
            source: err,
        })?;

        parse_list(kind, &content)
    }

    fn subscribe(
        &self,
        kind: ListKind,
        on_change: ChangeCallback,
    ) -> Result<Subscription, SourceError> {
        if !self.hot_reload {
            debug!(list = %kind, "hot reload disabled; list will not be re-read");
            return Ok(Subscription::inert());
        }

        let target = file_name(kind);
        let mut watcher = recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if is_relevant_event(&event.kind) && touches(&event.paths, &target) {
                    on_change(kind);
                }
            }
            Err(err) => error!(list = %kind, error = ?err, "settings watch error"),
        })
        .map_err(|err| SourceError::Watch {
            path: self.settings_dir.clone(),
            source: err,
        })?;

        watcher
            .watch(&self.settings_dir, RecursiveMode::NonRecursive)
            .map_err(|err| SourceError::Watch {
                path: self.settings_dir.clone(),
                source: err,
            })?;

        info!(
            list = %kind,
            path = %self.settings_dir.display(),
            "watching settings directory"
        );

        Ok(Subscription::new(watcher))
    }
}

fn file_name(kind: ListKind) -> OsString {
    OsString::from(format!("{}.json", kind.key()))
}

fn parse_list(kind: ListKind, content: &str) -> Result<Option<Vec<String>>, SourceError> {
    if content.trim().is_empty() {
        return Err(SourceError::Malformed {
            key: kind.key(),
            reason: "file is empty".to_string(),
        });
    }

    serde_json::from_str::<Option<Vec<String>>>(content).map_err(|err| SourceError::Malformed {
        key: kind.key(),
        reason: err.to_string(),
    })
}

fn is_relevant_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

fn touches(paths: &[PathBuf], target: &OsString) -> bool {
    paths
        .iter()
        .any(|path| path.file_name() == Some(target.as_os_str()))
}
