use std::collections::{HashMap, HashSet};

use kube::ResourceExt;
use kube::runtime::watcher;

use crate::crd::Shoot;
use crate::{
    ANNOTATION_ISSUER, ANNOTATION_ISSUER_MANAGED, ANNOTATION_TRUSTED,
};

/// Trust-related annotations of a shoot, parsed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrustMarkers {
    /// `authentication.gardener.cloud/issuer` is `managed`.
    pub issuer_managed: bool,
    /// `authentication.gardener.cloud/trusted` is `true` (any case).
    pub trusted: bool,
}

impl TrustMarkers {
    pub fn from_shoot(shoot: &Shoot) -> Self {
        let annotations = shoot.annotations();
        let issuer_managed = annotations
            .get(ANNOTATION_ISSUER)
            .is_some_and(|v| v == ANNOTATION_ISSUER_MANAGED);
        let trusted = annotations
            .get(ANNOTATION_TRUSTED)
            .is_some_and(|v| parse_trusted(v));
        Self {
            issuer_managed,
            trusted,
        }
    }

    pub fn is_relevant(&self) -> bool {
        self.issuer_managed && self.trusted
    }
}

/// Only a case-insensitive `true` counts; `false` and garbage are both false.
fn parse_trusted(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

pub fn is_relevant(shoot: &Shoot) -> bool {
    TrustMarkers::from_shoot(shoot).is_relevant()
}

/// Whether an update can change the desired OpenIDConnect resource.
pub fn is_relevant_transition(old: &Shoot, new: &Shoot) -> bool {
    let (old_relevant, new_relevant) = (is_relevant(old), is_relevant(new));
    if old_relevant != new_relevant {
        return true;
    }
    if !old_relevant && !new_relevant {
        return false;
    }
    if old.issuer_url() != new.issuer_url() {
        return true;
    }
    !old.is_deleting() && new.is_deleting()
}

#[derive(Debug, Clone, Copy)]
pub enum ShootEvent<'a> {
    Created(&'a Shoot),
    Updated { old: &'a Shoot, new: &'a Shoot },
    Deleted(&'a Shoot),
}

pub fn should_reconcile(event: ShootEvent<'_>) -> bool {
    match event {
        ShootEvent::Created(shoot) | ShootEvent::Deleted(shoot) => {
            is_relevant(shoot)
        }
        ShootEvent::Updated { old, new } => is_relevant_transition(old, new),
    }
}

/// Turns raw watcher events into create/update/delete decisions by keeping
/// the last version seen of every shoot.
#[derive(Default)]
pub struct EventFilter {
    last_seen: HashMap<(String, String), Shoot>,
    // keys listed during an in-flight relist
    relisted: Option<HashSet<(String, String)>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shoot to enqueue, if the event warrants a reconcile.
    pub fn filter(&mut self, event: watcher::Event<Shoot>) -> Option<Shoot> {
        match event {
            watcher::Event::Apply(shoot) | watcher::Event::InitApply(shoot) => {
                let key = key_of(&shoot);
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(key.clone());
                }
                let pass = match self.last_seen.get(&key) {
                    Some(old) => should_reconcile(ShootEvent::Updated {
                        old,
                        new: &shoot,
                    }),
                    None => should_reconcile(ShootEvent::Created(&shoot)),
                };
                self.last_seen.insert(key, shoot.clone());
                pass.then_some(shoot)
            }
            watcher::Event::Delete(shoot) => {
                self.last_seen.remove(&key_of(&shoot));
                should_reconcile(ShootEvent::Deleted(&shoot)).then_some(shoot)
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                None
            }
            watcher::Event::InitDone => {
                // forget shoots that vanished while the watch was down;
                // their children are left to the garbage collector
                if let Some(relisted) = self.relisted.take() {
                    self.last_seen.retain(|k, _| relisted.contains(k));
                }
                None
            }
        }
    }
}

fn key_of(shoot: &Shoot) -> (String, String) {
    (shoot.namespace().unwrap_or_default(), shoot.name_any())
}
