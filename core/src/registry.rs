//! Capability catalogs.
//!
//! A [`Registry`] maps names to handlers for one capability kind. Lookups
//! hand out `Arc`s, so invocations run without holding the registry lock.
//! Every registration batch notifies subscribers with a [`ListChanged`]
//! event; a running server forwards those as list-changed notifications.
//!
//! There is no process-wide catalog: each server owns its own [`Catalog`].

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_channel::{Receiver, Sender};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::prompt::{Prompt, PromptDefinition, PromptHandler};
use crate::resource::{Resource, ResourceDefinition, ResourceHandler, ResourceTemplateDefinition};
use crate::tool::{Tool, ToolDefinition, ToolHandler};

/// Kind of capability held by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Callable tools.
    Tools,
    /// Templated prompts.
    Prompts,
    /// Addressable resources.
    Resources,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tools => "tools",
            Self::Prompts => "prompts",
            Self::Resources => "resources",
        })
    }
}

/// Fired after a registry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListChanged(pub CapabilityKind);

/// A handler that can be stored in a [`Registry`].
pub trait Capability: Debug + Send + Sync + 'static {
    /// Kind of the capability.
    const KIND: CapabilityKind;
    /// Registry key.
    fn key(&self) -> &str;
}

impl Capability for ToolHandler {
    const KIND: CapabilityKind = CapabilityKind::Tools;
    fn key(&self) -> &str {
        self.name()
    }
}

impl Capability for PromptHandler {
    const KIND: CapabilityKind = CapabilityKind::Prompts;
    fn key(&self) -> &str {
        self.name()
    }
}

impl Capability for ResourceHandler {
    const KIND: CapabilityKind = CapabilityKind::Resources;
    fn key(&self) -> &str {
        self.uri()
    }
}

/// Name to handler map for one capability kind.
pub struct Registry<H> {
    entries: RwLock<BTreeMap<String, Arc<H>>>,
    subscribers: Mutex<Vec<Sender<ListChanged>>>,
}

/// Tool registry.
pub type Tools = Registry<ToolHandler>;
/// Prompt registry.
pub type Prompts = Registry<PromptHandler>;
/// Resource registry, keyed by URI or URI template.
pub type Resources = Registry<ResourceHandler>;

impl<H: Capability> Debug for Registry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &H::KIND)
            .field("entries", &self.names())
            .finish()
    }
}

impl<H: Capability> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Capability> Registry<H> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Inserts one handler. A handler already registered under the same key
    /// is replaced and returned.
    pub fn insert(&self, handler: H) -> Option<Arc<H>> {
        let replaced = self.store(handler);
        self.notify();
        replaced
    }

    /// Inserts a batch of handlers, notifying subscribers once.
    pub fn insert_all(&self, handlers: impl IntoIterator<Item = H>) {
        let mut stored = 0_usize;
        for handler in handlers {
            self.store(handler);
            stored += 1;
        }
        if stored > 0 {
            self.notify();
        }
    }

    /// Removes a handler by key.
    pub fn remove(&self, key: &str) -> Option<Arc<H>> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Looks up a handler by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<H>> {
        self.read().get(key).cloned()
    }

    /// Whether a handler is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// All handlers, ordered by key.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<H>> {
        self.read().values().cloned().collect()
    }

    /// All keys, ordered.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Subscribes to change events.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ListChanged> {
        let (sender, receiver) = async_channel::unbounded();
        self.add_subscriber(sender);
        receiver
    }

    fn add_subscriber(&self, sender: Sender<ListChanged>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<H>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, handler: H) -> Option<Arc<H>> {
        let key = handler.key().to_string();
        let replaced = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::new(handler));
        if replaced.is_some() {
            warn!("{} `{key}` registered twice, keeping the latest", H::KIND);
        } else {
            debug!("Registered {} `{key}`", H::KIND);
        }
        replaced
    }

    fn notify(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|sender| sender.try_send(ListChanged(H::KIND)).is_ok());
    }
}

impl Tools {
    /// Registers a tool, replacing any tool with the same name.
    pub fn register<T: Tool>(&self, tool: T) -> Option<Arc<ToolHandler>> {
        self.insert(ToolHandler::new(tool))
    }

    /// Definitions of all registered tools.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.read()
            .values()
            .map(|tool| tool.definition().clone())
            .collect()
    }
}

impl Prompts {
    /// Registers a prompt, replacing any prompt with the same name.
    pub fn register<P: Prompt>(&self, prompt: P) -> Option<Arc<PromptHandler>> {
        self.insert(PromptHandler::new(prompt))
    }

    /// Definitions of all registered prompts.
    #[must_use]
    pub fn definitions(&self) -> Vec<PromptDefinition> {
        self.read()
            .values()
            .map(|prompt| prompt.definition().clone())
            .collect()
    }
}

impl Resources {
    /// Registers a resource, replacing any resource with the same URI.
    pub fn register<R: Resource>(&self, resource: R) -> Option<Arc<ResourceHandler>> {
        self.insert(ResourceHandler::new(resource))
    }

    /// Definitions of concrete resources.
    #[must_use]
    pub fn definitions(&self) -> Vec<ResourceDefinition> {
        self.read()
            .values()
            .filter_map(|resource| resource.definition())
            .collect()
    }

    /// Definitions of templated resources.
    #[must_use]
    pub fn template_definitions(&self) -> Vec<ResourceTemplateDefinition> {
        self.read()
            .values()
            .filter_map(|resource| resource.template_definition())
            .collect()
    }

    /// Resolves a concrete URI: exact URIs first, then templates.
    #[must_use]
    pub fn resolve(&self, uri: &str) -> Option<(Arc<ResourceHandler>, Map<String, Value>)> {
        let entries = self.read();
        if let Some(handler) = entries.get(uri).filter(|handler| !handler.is_template()) {
            return Some((handler.clone(), Map::new()));
        }
        entries
            .values()
            .filter(|handler| handler.is_template())
            .find_map(|handler| handler.matches(uri).map(|vars| (handler.clone(), vars)))
    }
}

/// The tools, prompts and resources served by one server.
#[derive(Debug, Default)]
pub struct Catalog {
    /// Tools.
    pub tools: Tools,
    /// Prompts.
    pub prompts: Prompts,
    /// Resources.
    pub resources: Resources,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tools: Registry::new(),
            prompts: Registry::new(),
            resources: Registry::new(),
        }
    }

    /// Subscribes to change events of all three registries.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ListChanged> {
        let (sender, receiver) = async_channel::unbounded();
        self.tools.add_subscriber(sender.clone());
        self.prompts.add_subscriber(sender.clone());
        self.resources.add_subscriber(sender);
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;
    use std::borrow::Cow;

    #[derive(JsonSchema, Deserialize)]
    struct GreetArgs {
        name: String,
    }

    struct Greeter {
        greeting: &'static str,
    }

    impl Tool for Greeter {
        fn name(&self) -> Cow<'static, str> {
            "greeter".into()
        }
        fn description(&self) -> Cow<'static, str> {
            "Greets a person by name".into()
        }
        type Arguments = GreetArgs;
        type Output = String;

        async fn call(&self, args: Self::Arguments) -> Result {
            Ok(format!("{}, {}!", self.greeting, args.name))
        }
    }

    struct Named(&'static str);

    impl Tool for Named {
        fn name(&self) -> Cow<'static, str> {
            self.0.into()
        }
        fn description(&self) -> Cow<'static, str> {
            Cow::Borrowed("")
        }
        type Arguments = ();
        type Output = ();

        async fn call(&self, (): ()) -> Result<()> {
            Ok(())
        }
    }

    struct Page;

    impl Resource for Page {
        fn uri(&self) -> Cow<'static, str> {
            "test://{name}".into()
        }
        fn name(&self) -> Cow<'static, str> {
            "page".into()
        }
        type Arguments = serde_json::Map<String, Value>;
        type Output = String;

        async fn read(&self, args: Self::Arguments) -> Result {
            Ok(format!("page {}", args["name"]))
        }
    }

    struct Index;

    impl Resource for Index {
        fn uri(&self) -> Cow<'static, str> {
            "test://index".into()
        }
        fn name(&self) -> Cow<'static, str> {
            "index".into()
        }
        type Arguments = ();
        type Output = String;

        async fn read(&self, (): ()) -> Result {
            Ok("index".into())
        }
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let tools = Tools::new();
        assert!(tools.register(Greeter { greeting: "Hello" }).is_none());
        let replaced = tools.register(Greeter { greeting: "Howdy" });
        assert_eq!(replaced.map(|old| old.name().to_string()).as_deref(), Some("greeter"));
        assert_eq!(tools.len(), 1);

        let greeter = tools.get("greeter").unwrap();
        let args = json!({"name": "Alice"}).as_object().cloned().unwrap();
        let result = greeter.call(args).await;
        assert_eq!(result.first_text(), Some("Howdy, Alice!"));
    }

    #[test]
    fn registry_is_ordered_and_removable() {
        let tools = Tools::new();
        tools.insert_all([
            ToolHandler::new(Named("zeta")),
            ToolHandler::new(Named("alpha")),
        ]);
        assert_eq!(tools.names(), ["alpha", "zeta"]);
        assert_eq!(tools.definitions()[0].name(), "alpha");

        assert!(tools.remove("alpha").is_some());
        assert!(tools.remove("alpha").is_none());
        assert!(!tools.contains("alpha"));
        assert!(tools.get("missing").is_none());
    }

    #[test]
    fn batches_notify_once() {
        let catalog = Catalog::new();
        let events = catalog.subscribe();

        catalog.tools.insert_all([
            ToolHandler::new(Named("a")),
            ToolHandler::new(Named("b")),
        ]);
        catalog.resources.register(Index);
        catalog.tools.insert_all([]);

        assert_eq!(events.try_recv(), Ok(ListChanged(CapabilityKind::Tools)));
        assert_eq!(events.try_recv(), Ok(ListChanged(CapabilityKind::Resources)));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let tools = Tools::new();
        drop(tools.subscribe());
        tools.register(Named("a"));
        assert!(tools.subscribers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resources_resolve_exact_before_template() {
        let resources = Resources::new();
        resources.register(Page);
        resources.register(Index);

        assert_eq!(resources.definitions().len(), 1);
        assert_eq!(resources.template_definitions().len(), 1);

        let (handler, vars) = resources.resolve("test://index").unwrap();
        assert_eq!(handler.name(), "index");
        assert!(vars.is_empty());

        let (handler, vars) = resources.resolve("test://about").unwrap();
        assert_eq!(handler.name(), "page");
        let result = handler.read("test://about", vars).await.unwrap();
        assert_eq!(result.contents[0].as_text(), Some("page \"about\""));

        assert!(resources.resolve("other://x").is_none());
    }

    #[test]
    fn catalogs_are_independent() {
        let first = Catalog::new();
        let second = Catalog::new();
        first.tools.register(Named("only-here"));
        assert!(second.tools.get("only-here").is_none());
    }
}
