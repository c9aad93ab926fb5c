// src/core/whitelist.rs
//! Media application whitelists
//!
//! The static whitelist is fixed when the tracker is built. The dynamic
//! whitelist grows as peer discovery learns about other processes embedding
//! this library; it is shared by handle and never shrinks.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::core::app_types::{ApplicationIdentity, RunningApplication};

/// Media applications known to install their own media key taps
pub const KNOWN_MEDIA_APPLICATIONS: &[&str] = &[
    "at.justp.Theremin",
    "co.rackit.mate",
    "com.Timenut.SongKey",
    "com.apple.Aperture",
    "com.apple.QuickTimePlayerX",
    "com.apple.iPhoto",
    "com.apple.iTunes",
    "com.apple.iWork.Keynote",
    "com.apple.quicktimeplayer",
    "com.beardedspice.BeardedSpice",
    "com.beatport.BeatportPro",
    "com.bitcartel.pandorajam",
    "com.ilabs.PandorasHelper",
    "com.jriver.MediaCenter18",
    "com.jriver.MediaCenter19",
    "com.jriver.MediaCenter20",
    "com.macromedia.fireworks", // the tap messes up their mouse input
    "com.mahasoftware.pandabar",
    "com.netease.163music",
    "com.plexsquared.Plex",
    "com.plug.Plug",
    "com.plug.Plug2",
    "com.soundcloud.desktop",
    "com.spotify.client",
    "com.ttitt.b-music",
    "fm.last.Last.fm",
    "fm.last.Scrobbler",
    "org.clementine-player.clementine",
    "org.niltsh.MPlayerX",
    "org.quodlibet.quodlibet",
    "org.videolan.vlc",
    "ru.ya.themblsha.YandexMusic",
];

#[derive(Debug, Clone)]
pub struct StaticWhitelist {
    ids: HashSet<ApplicationIdentity>,
}

impl StaticWhitelist {
    /// The known media applications plus this process's own identifier.
    pub fn new(own: Option<&ApplicationIdentity>) -> Self {
        Self::with_additional(own, std::iter::empty())
    }

    pub fn with_additional<I>(own: Option<&ApplicationIdentity>, additional: I) -> Self
    where
        I: IntoIterator<Item = ApplicationIdentity>,
    {
        let mut ids: HashSet<ApplicationIdentity> = KNOWN_MEDIA_APPLICATIONS
            .iter()
            .map(|id| ApplicationIdentity::from(*id))
            .collect();
        ids.extend(additional);
        if let Some(own) = own {
            ids.insert(own.clone());
        }
        Self { ids }
    }

    pub fn contains(&self, id: &ApplicationIdentity) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Append-only set of identities learned from peers
#[derive(Debug, Clone, Default)]
pub struct DynamicWhitelist {
    ids: Arc<RwLock<HashSet<ApplicationIdentity>>>,
}

impl DynamicWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the identity was not known before.
    pub fn insert(&self, id: ApplicationIdentity) -> bool {
        self.ids
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id)
    }

    pub fn contains(&self, id: &ApplicationIdentity) -> bool {
        self.ids
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(id)
    }

    pub fn snapshot(&self) -> Vec<ApplicationIdentity> {
        let mut ids: Vec<_> = self
            .ids
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// Combined view used for every membership check
#[derive(Debug, Clone)]
pub struct Whitelist {
    statics: StaticWhitelist,
    dynamic: DynamicWhitelist,
}

impl Whitelist {
    pub fn new(statics: StaticWhitelist, dynamic: DynamicWhitelist) -> Self {
        Self { statics, dynamic }
    }

    pub fn in_static(&self, app: &RunningApplication) -> bool {
        app.bundle_identifier
            .as_ref()
            .is_some_and(|id| self.statics.contains(id))
    }

    pub fn in_dynamic(&self, app: &RunningApplication) -> bool {
        app.bundle_identifier
            .as_ref()
            .is_some_and(|id| self.dynamic.contains(id))
    }

    pub fn contains(&self, app: &RunningApplication) -> bool {
        self.in_static(app) || self.in_dynamic(app)
    }

    pub fn dynamic(&self) -> &DynamicWhitelist {
        &self.dynamic
    }
}
