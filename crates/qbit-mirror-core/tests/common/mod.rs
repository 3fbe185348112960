#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use qbit_mirror_core::config::{AppConfig, EndpointConfig, PolicyConfig, ReplicationConfig};
use qbit_mirror_core::remote::{AddOptions, AddStatus, Category, Item, RemoteEndpoint, StateFilter};
use qbit_mirror_core::RemoteError;

/// A mutation observed by a [`FakeEndpoint`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Export(String),
    Add(String, AddOptions),
    Delete(Vec<String>, bool),
    ForceActive(Vec<String>, bool),
    CreateCategory(String, String),
}

/// In-memory qBittorrent stand-in. Exported blobs are the item id as bytes.
pub struct FakeEndpoint {
    label: String,
    items: RefCell<Vec<Item>>,
    categories: RefCell<BTreeMap<String, Category>>,
    calls: RefCell<Vec<Call>>,
    /// State an added item lands in; defaults to `stalledUP`.
    state_on_add: RefCell<HashMap<String, String>>,
    /// Adds that answer "Ok." but never show up.
    phantom_adds: RefCell<HashSet<String>>,
    /// Deletes that return success but leave the item in place.
    sticky_deletes: RefCell<HashSet<String>>,
    pub fail_listing: Cell<bool>,
    pub fail_force_active: Cell<bool>,
    pub fail_categories: Cell<bool>,
    pub reject_adds: Cell<bool>,
}

impl FakeEndpoint {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            items: RefCell::new(Vec::new()),
            categories: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
            state_on_add: RefCell::new(HashMap::new()),
            phantom_adds: RefCell::new(HashSet::new()),
            sticky_deletes: RefCell::new(HashSet::new()),
            fail_listing: Cell::new(false),
            fail_force_active: Cell::new(false),
            fail_categories: Cell::new(false),
            reject_adds: Cell::new(false),
        }
    }

    pub fn with_items(label: &str, items: Vec<Item>) -> Self {
        let endpoint = Self::new(label);
        *endpoint.items.borrow_mut() = items;
        endpoint
    }

    pub fn insert(&self, item: Item) {
        self.items.borrow_mut().retain(|i| i.id != item.id);
        self.items.borrow_mut().push(item);
    }

    pub fn remove(&self, id: &str) {
        self.items.borrow_mut().retain(|i| i.id != id);
    }

    pub fn set_state(&self, id: &str, state: &str) {
        for item in self.items.borrow_mut().iter_mut() {
            if item.id == id {
                item.state = state.to_string();
            }
        }
    }

    pub fn add_category(&self, name: &str, save_path: &str) {
        self.categories.borrow_mut().insert(
            name.to_string(),
            Category {
                name: name.to_string(),
                save_path: save_path.to_string(),
            },
        );
    }

    pub fn land_in_state(&self, id: &str, state: &str) {
        self.state_on_add
            .borrow_mut()
            .insert(id.to_string(), state.to_string());
    }

    pub fn make_adds_phantom(&self, id: &str) {
        self.phantom_adds.borrow_mut().insert(id.to_string());
    }

    pub fn make_deletes_sticky(&self, id: &str) {
        self.sticky_deletes.borrow_mut().insert(id.to_string());
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.borrow().iter().map(|i| i.id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn has(&self, id: &str) -> bool {
        self.items.borrow().iter().any(|i| i.id == id)
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.borrow().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn mutation_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| !matches!(c, Call::Export(_)))
            .count()
    }

    pub fn added_ids(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Add(id, _) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn exported_ids(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Export(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<(Vec<String>, bool)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Delete(ids, files) => Some((ids.clone(), *files)),
                _ => None,
            })
            .collect()
    }

    fn listing_guard(&self) -> Result<(), RemoteError> {
        if self.fail_listing.get() {
            return Err(RemoteError::Other(format!("{} is unreachable", self.label)));
        }
        Ok(())
    }
}

impl RemoteEndpoint for FakeEndpoint {
    fn label(&self) -> &str {
        &self.label
    }

    fn version(&self) -> Result<String, RemoteError> {
        Ok("v4.6.0".to_string())
    }

    fn list(&self, filter: Option<StateFilter>) -> Result<Vec<Item>, RemoteError> {
        self.listing_guard()?;
        Ok(self
            .items
            .borrow()
            .iter()
            .filter(|i| filter.map_or(true, |f| f.matches(&i.state)))
            .cloned()
            .collect())
    }

    /// Hashes match case-insensitively, like the WebUI's `hashes=` filter.
    fn list_by_ids(&self, ids: &[&str]) -> Result<Vec<Item>, RemoteError> {
        self.listing_guard()?;
        Ok(self
            .items
            .borrow()
            .iter()
            .filter(|i| ids.iter().any(|id| id.eq_ignore_ascii_case(&i.id)))
            .cloned()
            .collect())
    }

    fn export(&self, id: &str) -> Result<Vec<u8>, RemoteError> {
        self.calls.borrow_mut().push(Call::Export(id.to_string()));
        if !self.has(id) {
            return Err(RemoteError::Status {
                endpoint: self.label.clone(),
                path: "/api/v2/torrents/export".to_string(),
                status: 404,
            });
        }
        Ok(id.as_bytes().to_vec())
    }

    fn add(&self, blob: &[u8], options: &AddOptions) -> Result<AddStatus, RemoteError> {
        let id = String::from_utf8_lossy(blob).into_owned();
        self.calls
            .borrow_mut()
            .push(Call::Add(id.clone(), options.clone()));
        if self.reject_adds.get() {
            return Ok(AddStatus::Rejected("Fails.".to_string()));
        }
        if self.phantom_adds.borrow().contains(&id) || self.has(&id) {
            return Ok(AddStatus::Accepted);
        }
        let state = self
            .state_on_add
            .borrow()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| "stalledUP".to_string());
        self.items.borrow_mut().push(Item {
            id: id.clone(),
            name: format!("name-{}", id),
            category: options.category.clone(),
            size_bytes: 0,
            state,
            save_path: options.save_path.clone(),
            tags: options.tags.clone(),
            ratio: 0.0,
            uploaded_bytes: 0,
            auto_managed: options.auto_managed,
        });
        Ok(AddStatus::Accepted)
    }

    fn delete(&self, ids: &[&str], delete_files: bool) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(Call::Delete(
            ids.iter().map(|s| s.to_string()).collect(),
            delete_files,
        ));
        let sticky = self.sticky_deletes.borrow().clone();
        self.items
            .borrow_mut()
            .retain(|i| !ids.contains(&i.id.as_str()) || sticky.contains(&i.id));
        Ok(())
    }

    fn set_force_active(&self, ids: &[&str], enable: bool) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(Call::ForceActive(
            ids.iter().map(|s| s.to_string()).collect(),
            enable,
        ));
        if self.fail_force_active.get() {
            return Err(RemoteError::Other("force start refused".to_string()));
        }
        Ok(())
    }

    fn list_categories(&self) -> Result<BTreeMap<String, Category>, RemoteError> {
        self.listing_guard()?;
        if self.fail_categories.get() {
            return Err(RemoteError::Status {
                endpoint: self.label.clone(),
                path: "/api/v2/torrents/categories".to_string(),
                status: 500,
            });
        }
        Ok(self.categories.borrow().clone())
    }

    fn create_category(&self, name: &str, save_path: &str) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(Call::CreateCategory(
            name.to_string(),
            save_path.to_string(),
        ));
        self.add_category(name, save_path);
        Ok(())
    }
}

pub fn seeding_item(id: &str, category: &str, size_bytes: i64) -> Item {
    Item {
        id: id.to_string(),
        name: format!("name-{}", id),
        category: category.to_string(),
        size_bytes,
        state: "stalledUP".to_string(),
        save_path: format!("/data/{}", category),
        tags: "mirror".to_string(),
        ratio: 1.0,
        uploaded_bytes: size_bytes,
        auto_managed: false,
    }
}

pub fn item_in_state(id: &str, state: &str) -> Item {
    Item {
        state: state.to_string(),
        ..seeding_item(id, "", 1_000)
    }
}

fn endpoint(host: &str) -> EndpointConfig {
    EndpointConfig {
        host: host.to_string(),
        port: 8080,
        use_https: false,
        verify_ssl: true,
        username: "admin".to_string(),
        password: "adminadmin".to_string(),
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        source: endpoint("source.test"),
        destination: endpoint("destination.test"),
        database_file: ":memory:".into(),
        log_file: "qbit-mirror.log".into(),
        verbose: 1,
        request_timeout_secs: 5,
        replication: ReplicationConfig::default(),
        policy: PolicyConfig::default(),
    }
}
