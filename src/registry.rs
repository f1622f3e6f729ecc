use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ApiResult;
use crate::model::entity::{Entity, EntityState};

/// A hue room, made from one Home Assistant area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    /// Light ids, ascending
    pub lights: Vec<u32>,
}

/// Maps backend entities to hue light ids.
///
/// Ids are handed out on first sight, starting at 1, and are never reused for
/// another entity. An entity that disappears from the backend keeps its id
/// reserved, so it gets the same id back if it returns. Areas get group ids
/// the same way, but those are not persisted.
#[derive(Debug, Default)]
pub struct Registry {
    filter: Vec<String>,
    ids: BTreeMap<String, u32>,
    group_ids: BTreeMap<String, u32>,
    entities: BTreeMap<u32, Entity>,
    names: BTreeMap<u32, String>,
    id_file: Option<Utf8PathBuf>,
}

impl Registry {
    /// Create an empty registry. `filter` is a lowercase label allow-list;
    /// when empty, every entity is admitted.
    #[must_use]
    pub fn new(filter: Vec<String>) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Like [`Registry::new`], but id assignments are loaded from (and saved
    /// to) `path`, so they survive restarts.
    pub fn with_id_cache(filter: Vec<String>, path: &Utf8Path) -> ApiResult<Self> {
        let ids = if path.is_file() {
            log::debug!("Loading light id cache from [{path}]");
            let ids: BTreeMap<String, u32> = serde_yml::from_reader(File::open(path)?)?;
            let ids = dedup_ids(ids);
            log::info!("Loaded {} light id assignments", ids.len());
            ids
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            filter,
            ids,
            id_file: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    fn next_id(&self) -> Option<u32> {
        next_free(self.ids.values().copied())
    }

    fn save_ids(&self) -> ApiResult<()> {
        let Some(path) = &self.id_file else {
            return Ok(());
        };

        let tmp = path.with_extension("tmp");
        serde_yml::to_writer(File::create(&tmp)?, &self.ids)?;
        fs::rename(&tmp, path)?;
        log::debug!("Saved {} light id assignments to [{path}]", self.ids.len());
        Ok(())
    }

    /// Replace the current snapshot. Entities not admitted by the label filter
    /// are dropped. Returns the number of newly assigned ids.
    pub fn apply_snapshot(&mut self, entities: impl IntoIterator<Item = Entity>) -> usize {
        let mut snapshot = BTreeMap::new();
        let mut added = 0;

        for mut entity in entities {
            if !entity.matches_labels(&self.filter) {
                log::trace!("Ignoring {} (no matching label)", entity.entity_id);
                continue;
            }

            let id = if let Some(id) = self.ids.get(&entity.entity_id) {
                *id
            } else {
                let Some(id) = self.next_id() else {
                    log::error!("No light id left for {}", entity.entity_id);
                    continue;
                };
                log::info!("Assigned light id {id} to {}", entity.entity_id);
                self.ids.insert(entity.entity_id.clone(), id);
                added += 1;
                id
            };

            if let Some(area) = &entity.area {
                if !self.group_ids.contains_key(&area.id) {
                    if let Some(gid) = next_free(self.group_ids.values().copied()) {
                        log::debug!("Assigned group id {gid} to area {}", area.id);
                        self.group_ids.insert(area.id.clone(), gid);
                    }
                }
            }

            if let Some(name) = self.names.get(&id) {
                entity.name.clone_from(name);
            }

            snapshot.insert(id, entity);
        }

        self.entities = snapshot;

        if added > 0 {
            if let Err(err) = self.save_ids() {
                log::warn!("Failed to save light id cache: {err}");
            }
        }

        added
    }

    /// Update the state of a single entity. Returns false if the entity is
    /// not part of the current snapshot.
    pub fn update_state(&mut self, entity_id: &str, state: EntityState) -> bool {
        let Some(id) = self.ids.get(entity_id) else {
            return false;
        };

        match self.entities.get_mut(id) {
            Some(entity) => {
                entity.state = state;
                true
            }
            None => false,
        }
    }

    /// Set a bridge-local display name. Survives snapshot refreshes.
    pub fn rename(&mut self, light_id: u32, name: &str) -> Option<&Entity> {
        let entity = self.entities.get_mut(&light_id)?;
        entity.name = name.to_string();
        self.names.insert(light_id, name.to_string());
        Some(entity)
    }

    #[must_use]
    pub fn get(&self, light_id: u32) -> Option<&Entity> {
        self.entities.get(&light_id)
    }

    #[must_use]
    pub fn light_id(&self, entity_id: &str) -> Option<u32> {
        self.ids
            .get(entity_id)
            .copied()
            .filter(|id| self.entities.contains_key(id))
    }

    /// Rooms holding at least one light of the current snapshot, by group id.
    #[must_use]
    pub fn groups(&self) -> BTreeMap<u32, Group> {
        let mut groups: BTreeMap<u32, Group> = BTreeMap::new();

        for (id, entity) in &self.entities {
            let Some(area) = &entity.area else {
                continue;
            };
            let Some(gid) = self.group_ids.get(&area.id) else {
                continue;
            };
            groups
                .entry(*gid)
                .or_insert_with(|| Group {
                    name: area.name.clone(),
                    lights: vec![],
                })
                .lights
                .push(*id);
        }

        groups
    }

    /// All lights in the current snapshot, in id order.
    pub fn lights(&self) -> impl Iterator<Item = (u32, &Entity)> {
        self.entities.iter().map(|(id, ent)| (*id, ent))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Lowest unused id above every id in use, or the lowest free gap when the
/// top of the range is taken.
fn next_free(used: impl Iterator<Item = u32>) -> Option<u32> {
    let used: BTreeSet<u32> = used.collect();
    match used.last() {
        None => Some(1),
        Some(max) => max
            .checked_add(1)
            .or_else(|| (1..u32::MAX).find(|id| !used.contains(id))),
    }
}

/// Drop invalid entries from a loaded id cache: id 0, and every entity but
/// the first claiming an already used id.
fn dedup_ids(ids: BTreeMap<String, u32>) -> BTreeMap<String, u32> {
    let mut seen = BTreeSet::new();
    let mut res = BTreeMap::new();

    for (entity_id, id) in ids {
        if id == 0 {
            log::warn!("Ignoring light id 0 for {entity_id} in id cache");
        } else if !seen.insert(id) {
            log::warn!("Ignoring duplicate light id {id} for {entity_id} in id cache");
        } else {
            res.insert(entity_id, id);
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use camino::Utf8PathBuf;

    use crate::model::entity::{Area, Capabilities, Domain, Entity, EntityState};
    use crate::registry::{Group, Registry};

    fn entity(entity_id: &str, labels: &[&str]) -> Entity {
        Entity {
            entity_id: entity_id.to_string(),
            domain: Domain::Light,
            name: entity_id.to_string(),
            labels: labels.iter().map(ToString::to_string).collect::<BTreeSet<_>>(),
            area: None,
            capabilities: Capabilities::default(),
            state: EntityState::default(),
        }
    }

    fn in_area(entity_id: &str, area: &str) -> Entity {
        Entity {
            area: Some(Area {
                id: area.to_lowercase(),
                name: area.to_string(),
            }),
            ..entity(entity_id, &[])
        }
    }

    fn filter(labels: &[&str]) -> Vec<String> {
        labels.iter().map(ToString::to_string).collect()
    }

    fn temp_path(name: &str) -> Utf8PathBuf {
        let dir = Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap();
        dir.join(format!("emuhue-{}-{name}.yaml", std::process::id()))
    }

    #[test]
    fn ids_start_at_one_and_are_stable() {
        let mut reg = Registry::new(vec![]);
        assert_eq!(reg.apply_snapshot([entity("light.a", &[]), entity("light.b", &[])]), 2);

        assert_eq!(reg.light_id("light.a"), Some(1));
        assert_eq!(reg.light_id("light.b"), Some(2));

        // reordered and extended snapshot
        let added = reg.apply_snapshot([
            entity("light.c", &[]),
            entity("light.b", &[]),
            entity("light.a", &[]),
        ]);
        assert_eq!(added, 1);
        assert_eq!(reg.light_id("light.a"), Some(1));
        assert_eq!(reg.light_id("light.b"), Some(2));
        assert_eq!(reg.light_id("light.c"), Some(3));
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn removed_entity_keeps_its_id_reserved() {
        let mut reg = Registry::new(vec![]);
        reg.apply_snapshot([entity("light.a", &[]), entity("light.b", &[])]);

        reg.apply_snapshot([entity("light.a", &[])]);
        assert_eq!(reg.light_id("light.b"), None);
        assert!(reg.get(2).is_none());

        reg.apply_snapshot([entity("light.a", &[]), entity("light.new", &[])]);
        assert_eq!(reg.light_id("light.new"), Some(3));

        reg.apply_snapshot([entity("light.b", &[])]);
        assert_eq!(reg.light_id("light.b"), Some(2));
    }

    #[test]
    fn label_filter_excludes_other_labels() {
        let mut reg = Registry::new(filter(&["kitchen", "office"]));
        reg.apply_snapshot([
            entity("light.kitchen", &["kitchen"]),
            entity("light.bed", &["bedroom"]),
            entity("light.desk", &["office", "bedroom"]),
            entity("light.none", &[]),
        ]);

        let ids: Vec<&str> = reg.lights().map(|(_, e)| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["light.kitchen", "light.desk"]);
        assert_eq!(reg.light_id("light.bed"), None);
    }

    #[test]
    fn update_state_only_for_known_entities() {
        let mut reg = Registry::new(vec![]);
        reg.apply_snapshot([entity("light.a", &[])]);

        let state = EntityState {
            available: true,
            on: true,
            ..EntityState::default()
        };
        assert!(reg.update_state("light.a", state.clone()));
        assert!(!reg.update_state("light.zzz", state));
        assert!(reg.get(1).unwrap().state.on);
    }

    #[test]
    fn rename_survives_refresh() {
        let mut reg = Registry::new(vec![]);
        reg.apply_snapshot([entity("light.a", &[])]);

        assert_eq!(reg.rename(1, "Reading lamp").unwrap().name, "Reading lamp");
        assert!(reg.rename(7, "Nope").is_none());

        reg.apply_snapshot([entity("light.a", &[])]);
        assert_eq!(reg.get(1).unwrap().name, "Reading lamp");
    }

    #[test]
    fn id_cache_round_trip() {
        let path = temp_path("ids");
        let _ = std::fs::remove_file(&path);

        let mut reg = Registry::with_id_cache(vec![], &path).unwrap();
        reg.apply_snapshot([entity("light.a", &[]), entity("light.b", &[])]);

        let mut reg = Registry::with_id_cache(vec![], &path).unwrap();
        reg.apply_snapshot([entity("light.b", &[]), entity("light.c", &[])]);
        assert_eq!(reg.light_id("light.b"), Some(2));
        assert_eq!(reg.light_id("light.c"), Some(3));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn duplicate_ids_in_cache_are_dropped() {
        let path = temp_path("dup-ids");
        std::fs::write(&path, "light.a: 1\nlight.b: 1\nlight.c: 0\nlight.d: 2\n").unwrap();

        let mut reg = Registry::with_id_cache(vec![], &path).unwrap();
        reg.apply_snapshot([
            entity("light.a", &[]),
            entity("light.b", &[]),
            entity("light.c", &[]),
            entity("light.d", &[]),
        ]);

        assert_eq!(reg.len(), 4);
        assert_eq!(reg.light_id("light.a"), Some(1));
        assert_eq!(reg.light_id("light.d"), Some(2));
        assert_eq!(reg.light_id("light.b"), Some(3));
        assert_eq!(reg.light_id("light.c"), Some(4));
        assert_eq!(reg.get(1).unwrap().entity_id, "light.a");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn id_assignment_does_not_overflow() {
        let path = temp_path("max-id");
        std::fs::write(&path, format!("light.top: {}\n", u32::MAX)).unwrap();

        let mut reg = Registry::with_id_cache(vec![], &path).unwrap();
        reg.apply_snapshot([entity("light.top", &[]), entity("light.new", &[])]);

        assert_eq!(reg.light_id("light.top"), Some(u32::MAX));
        assert_eq!(reg.light_id("light.new"), Some(1));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn areas_become_groups() {
        let mut reg = Registry::new(vec![]);
        reg.apply_snapshot([
            in_area("light.a", "Kitchen"),
            entity("light.b", &[]),
            in_area("light.c", "Office"),
            in_area("light.d", "Kitchen"),
        ]);

        let groups = reg.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[&1],
            Group {
                name: "Kitchen".into(),
                lights: vec![1, 4],
            }
        );
        assert_eq!(groups[&2].lights, vec![3]);

        // empty rooms disappear, but keep their id
        reg.apply_snapshot([in_area("light.a", "Kitchen"), entity("light.b", &[])]);
        assert_eq!(reg.groups().keys().copied().collect::<Vec<_>>(), vec![1]);

        reg.apply_snapshot([in_area("light.c", "Office"), in_area("light.e", "Garage")]);
        let groups = reg.groups();
        assert_eq!(groups[&2].name, "Office");
        assert_eq!(groups[&3].name, "Garage");
    }
}
