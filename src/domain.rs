//! Binding domain objects returned by tools and exposing their operations.
//!
//! When a tool result carries an [`Artifact`](crate::Artifact), each object in
//! it is a binding candidate. In auto-discovery mode any object exposing at
//! least one tool qualifies and a new binding replaces every previous one. In
//! registered mode only objects of a registered type qualify (optionally
//! filtered by a predicate over the object and the process), and each type
//! keeps its own binding. In both modes the latest qualifying instance wins.
//!
//! The [`DomainToolTracker`] holds the bindings. It can be shared by several
//! loops of one agent run through a [`SharedDomainTracker`]. Bindings outlive a
//! single loop invocation: the next invocation starts with the bound tools
//! already visible. Use [`DomainToolInjection::per_run`] to start every
//! invocation without bindings instead.

use crate::artifact::{AsAny, DomainObject, DomainType, downcast_object};
use crate::injection::{ToolInjectionContext, ToolInjectionResult, ToolInjectionStrategy};
use crate::process::ProcessContext;
use crate::tools::{Tool, ToolBinding};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type BindingPredicate = Arc<dyn Fn(&dyn DomainObject, &ProcessContext) -> bool + Send + Sync>;

/// A registered domain type, optionally guarded by a predicate.
#[derive(Clone)]
pub struct DomainToolSource {
    domain_type: DomainType,
    predicate: Option<BindingPredicate>,
}

impl DomainToolSource {
    pub fn of<T: DomainObject>() -> Self {
        Self {
            domain_type: DomainType::of::<T>(),
            predicate: None,
        }
    }

    /// Only bind instances for which `predicate` holds.
    pub fn matching<T, F>(predicate: F) -> Self
    where
        T: DomainObject,
        F: Fn(&T, &ProcessContext) -> bool + Send + Sync + 'static,
    {
        Self {
            domain_type: DomainType::of::<T>(),
            predicate: Some(Arc::new(move |object: &dyn DomainObject, process: &ProcessContext| {
                object
                    .as_any()
                    .downcast_ref::<T>()
                    .is_some_and(|typed| predicate(typed, process))
            })),
        }
    }

    pub fn domain_type(&self) -> DomainType {
        self.domain_type
    }

    pub fn accepts(&self, object: &dyn DomainObject, process: &ProcessContext) -> bool {
        DomainType::of_val(object) == self.domain_type
            && self
                .predicate
                .as_ref()
                .is_none_or(|predicate| predicate(object, process))
    }
}

impl fmt::Debug for DomainToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainToolSource")
            .field("domain_type", &self.domain_type)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum DiscoveryMode {
    /// Any object with tools binds; one binding at a time.
    AutoDiscovery,
    /// Only registered types bind; one binding per type.
    Registered(Vec<DomainToolSource>),
}

/// A binding the tracker would make for a candidate object.
#[derive(Clone)]
pub struct PlannedBinding {
    pub domain_type: DomainType,
    pub instance: Arc<dyn DomainObject>,
    /// The instance's tools, stamped with their binding.
    pub tools: Vec<Arc<Tool>>,
}

#[derive(Clone)]
struct Binding {
    domain_type: DomainType,
    instance: Arc<dyn DomainObject>,
    tools: Vec<Arc<Tool>>,
}

/// Current bindings, keyed by domain type.
pub struct DomainToolTracker {
    mode: DiscoveryMode,
    bindings: Vec<Binding>,
}

pub type SharedDomainTracker = Arc<Mutex<DomainToolTracker>>;

impl DomainToolTracker {
    pub fn auto_discovery() -> Self {
        Self {
            mode: DiscoveryMode::AutoDiscovery,
            bindings: Vec::new(),
        }
    }

    pub fn registered(sources: impl IntoIterator<Item = DomainToolSource>) -> Self {
        Self {
            mode: DiscoveryMode::Registered(sources.into_iter().collect()),
            bindings: Vec::new(),
        }
    }

    /// Wrap for sharing between loops.
    pub fn shared(self) -> SharedDomainTracker {
        Arc::new(Mutex::new(self))
    }

    pub fn mode(&self) -> &DiscoveryMode {
        &self.mode
    }

    /// The binding this object would produce, or `None` when it does not
    /// qualify, exposes no tools, or is already the bound instance.
    pub fn plan(
        &self,
        object: &Arc<dyn DomainObject>,
        process: &ProcessContext,
    ) -> Option<PlannedBinding> {
        let domain_type = match &self.mode {
            DiscoveryMode::AutoDiscovery => DomainType::of_val(object.as_ref()),
            DiscoveryMode::Registered(sources) => sources
                .iter()
                .find(|source| source.accepts(object.as_ref(), process))?
                .domain_type(),
        };

        if self.is_bound(object) {
            return None;
        }

        let binding = ToolBinding {
            domain_type,
            instance: Arc::clone(object),
        };
        let tools: Vec<Arc<Tool>> = Arc::clone(object)
            .tools()
            .into_iter()
            .map(|tool| Arc::new(tool.bound_to(binding.clone())))
            .collect();
        if tools.is_empty() {
            log::debug!("{} exposes no tools; not binding", domain_type);
            return None;
        }

        Some(PlannedBinding {
            domain_type,
            instance: Arc::clone(object),
            tools,
        })
    }

    /// Record a binding. Returns the tools of bindings it displaced.
    pub fn bind(&mut self, planned: PlannedBinding) -> Vec<Arc<Tool>> {
        let displaced: Vec<Binding> = match self.mode {
            DiscoveryMode::AutoDiscovery => std::mem::take(&mut self.bindings),
            DiscoveryMode::Registered(_) => {
                let (same_type, others): (Vec<Binding>, Vec<Binding>) = std::mem::take(&mut self.bindings)
                    .into_iter()
                    .partition(|b| b.domain_type == planned.domain_type);
                self.bindings = others;
                same_type
            }
        };

        log::debug!(
            "Bound {} ({} tools, {} displaced bindings)",
            planned.domain_type,
            planned.tools.len(),
            displaced.len()
        );
        self.bindings.push(Binding {
            domain_type: planned.domain_type,
            instance: planned.instance,
            tools: planned.tools,
        });

        displaced.into_iter().flat_map(|b| b.tools).collect()
    }

    /// Plan and bind in one step. Returns the newly exposed tools.
    pub fn try_bind(
        &mut self,
        object: &Arc<dyn DomainObject>,
        process: &ProcessContext,
    ) -> Option<Vec<Arc<Tool>>> {
        let planned = self.plan(object, process)?;
        let tools = planned.tools.clone();
        self.bind(planned);
        Some(tools)
    }

    pub fn is_bound(&self, object: &Arc<dyn DomainObject>) -> bool {
        self.bindings
            .iter()
            .any(|b| Arc::ptr_eq(&b.instance, object))
    }

    pub fn bound_instance<T: DomainObject>(&self) -> Option<Arc<T>> {
        let wanted = DomainType::of::<T>();
        self.bindings
            .iter()
            .find(|b| b.domain_type == wanted)
            .and_then(|b| downcast_object::<T>(&b.instance))
    }

    pub fn bound_artifacts(&self) -> Vec<Arc<dyn DomainObject>> {
        self.bindings.iter().map(|b| Arc::clone(&b.instance)).collect()
    }

    pub fn bound_tools(&self) -> Vec<Arc<Tool>> {
        self.bindings.iter().flat_map(|b| b.tools.iter().cloned()).collect()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

impl fmt::Debug for DomainToolTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainToolTracker")
            .field("mode", &self.mode)
            .field(
                "bindings",
                &self
                    .bindings
                    .iter()
                    .map(|b| DomainType::of_val(b.instance.as_ref()).name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Strategy binding artifacts from tool results and exposing their tools.
#[derive(Debug, Clone)]
pub struct DomainToolInjection {
    tracker: SharedDomainTracker,
    per_run: bool,
}

impl DomainToolInjection {
    pub fn new(tracker: SharedDomainTracker) -> Self {
        Self {
            tracker,
            per_run: false,
        }
    }

    /// Clear the tracker whenever a loop invocation starts.
    pub fn per_run(mut self) -> Self {
        self.per_run = true;
        self
    }

    pub fn auto_discovery() -> Self {
        Self::new(DomainToolTracker::auto_discovery().shared())
    }

    pub fn registered(sources: impl IntoIterator<Item = DomainToolSource>) -> Self {
        Self::new(DomainToolTracker::registered(sources).shared())
    }

    pub fn tracker(&self) -> SharedDomainTracker {
        Arc::clone(&self.tracker)
    }

    fn lock(&self) -> MutexGuard<'_, DomainToolTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ToolInjectionStrategy for DomainToolInjection {
    fn name(&self) -> &str {
        "domain-binding"
    }

    fn begin_run(&self, process: &ProcessContext) -> Vec<Arc<Tool>> {
        let mut tracker = self.lock();
        if self.per_run {
            tracker.clear();
            return Vec::new();
        }
        let kept = tracker.bound_tools();
        if !kept.is_empty() {
            log::debug!(
                "Run {} starts with {} tools from kept bindings",
                process.id(),
                kept.len()
            );
        }
        kept
    }

    fn evaluate(&self, ctx: &ToolInjectionContext<'_>) -> ToolInjectionResult {
        let Some(artifact) = ctx.call.output.artifact() else {
            return ToolInjectionResult::NoChange;
        };

        let tracker = self.lock();
        let auto = matches!(tracker.mode(), DiscoveryMode::AutoDiscovery);
        let mut plans: Vec<PlannedBinding> = Vec::new();
        for object in artifact.objects() {
            if let Some(plan) = tracker.plan(&object, ctx.process) {
                if auto {
                    plans.clear();
                } else {
                    plans.retain(|p| p.domain_type != plan.domain_type);
                }
                plans.push(plan);
            }
        }

        if plans.is_empty() {
            ToolInjectionResult::NoChange
        } else {
            ToolInjectionResult::Add(plans.into_iter().flat_map(|p| p.tools).collect())
        }
    }

    fn commit(
        &self,
        _process: &ProcessContext,
        accepted: &[ToolInjectionResult],
    ) -> Vec<Arc<Tool>> {
        let mut tracker = self.lock();
        let mut released = Vec::new();

        for result in accepted {
            let mut groups: Vec<PlannedBinding> = Vec::new();
            for tool in result.additions() {
                let Some(binding) = tool.binding() else {
                    continue;
                };
                match groups
                    .iter_mut()
                    .find(|g| Arc::ptr_eq(&g.instance, &binding.instance))
                {
                    Some(group) => group.tools.push(Arc::clone(tool)),
                    None => groups.push(PlannedBinding {
                        domain_type: binding.domain_type,
                        instance: Arc::clone(&binding.instance),
                        tools: vec![Arc::clone(tool)],
                    }),
                }
            }
            for planned in groups {
                released.extend(tracker.bind(planned));
            }
        }
        released
    }

    fn bound_artifacts(&self) -> Vec<Arc<dyn DomainObject>> {
        self.lock().bound_artifacts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::injection::CompletedToolCall;
    use crate::tools::{ToolOutput, tool};
    use serde_json::json;

    struct Order {
        id: u32,
        vip: bool,
    }

    impl DomainObject for Order {
        fn tools(self: Arc<Self>) -> Vec<Tool> {
            let id = self.id;
            vec![tool("order_status", "Status of the bound order")
                .build(move |_| async move { Ok(json!({"order": id})) })]
        }
    }

    struct Customer {
        name: &'static str,
    }

    impl DomainObject for Customer {
        fn tools(self: Arc<Self>) -> Vec<Tool> {
            let name = self.name;
            vec![
                tool("customer_name", "Name of the bound customer")
                    .build(move |_| async move { Ok(json!(name)) }),
                tool("customer_orders", "Orders of the bound customer")
                    .build(|_| async { Ok(json!([])) }),
            ]
        }
    }

    struct Inert;
    impl DomainObject for Inert {}

    fn order(id: u32) -> Arc<dyn DomainObject> {
        Arc::new(Order { id, vip: false })
    }

    fn evaluate_and_commit(
        strategy: &DomainToolInjection,
        artifact: Artifact,
    ) -> (ToolInjectionResult, Vec<Arc<Tool>>) {
        let process = ProcessContext::default();
        let producer = Arc::new(tool("fetch", "Fetch").build(|_| async { Ok(json!("ok")) }));
        let call = CompletedToolCall {
            tool_use_id: "call_1".into(),
            name: "fetch".into(),
            input: json!({}),
            tool: Arc::clone(&producer),
            output: ToolOutput::with_artifact("fetched", artifact),
        };
        let visible = vec![producer];
        let result = strategy.evaluate(&ToolInjectionContext {
            visible_tools: &visible,
            call: &call,
            iteration: 0,
            history: &[],
            process: &process,
        });
        let released = strategy.commit(&process, std::slice::from_ref(&result));
        (result, released)
    }

    #[test]
    fn test_registered_last_wins() {
        let strategy = DomainToolInjection::registered([DomainToolSource::of::<Order>()]);

        let (first, _) = evaluate_and_commit(&strategy, Artifact::Object(order(1)));
        assert_eq!(first.additions().len(), 1);

        let (second, released) = evaluate_and_commit(&strategy, Artifact::Object(order(2)));
        assert_eq!(second.additions().len(), 1);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id(), first.additions()[0].id());

        let tracker = strategy.tracker();
        let bound = tracker.lock().unwrap().bound_instance::<Order>().unwrap();
        assert_eq!(bound.id, 2);
        assert_eq!(strategy.bound_artifacts().len(), 1);
    }

    #[test]
    fn test_same_instance_is_not_rebound() {
        let strategy = DomainToolInjection::registered([DomainToolSource::of::<Order>()]);
        let same = order(7);

        let (first, _) = evaluate_and_commit(&strategy, Artifact::Object(Arc::clone(&same)));
        assert!(!first.is_no_change());
        let (second, released) = evaluate_and_commit(&strategy, Artifact::Object(same));
        assert!(second.is_no_change());
        assert!(released.is_empty());
    }

    #[test]
    fn test_registered_types_bind_independently() {
        let strategy = DomainToolInjection::registered([
            DomainToolSource::of::<Order>(),
            DomainToolSource::of::<Customer>(),
        ]);

        evaluate_and_commit(&strategy, Artifact::Object(order(1)));
        let (result, released) = evaluate_and_commit(
            &strategy,
            Artifact::object(Customer { name: "ada" }),
        );
        assert_eq!(result.additions().len(), 2);
        assert!(released.is_empty());

        let tracker = strategy.tracker();
        let tracker = tracker.lock().unwrap();
        assert!(tracker.bound_instance::<Order>().is_some());
        assert!(tracker.bound_instance::<Customer>().is_some());
        assert_eq!(tracker.bound_tools().len(), 3);
    }

    #[test]
    fn test_unregistered_type_and_predicate_rejection() {
        let strategy = DomainToolInjection::registered([DomainToolSource::matching::<Order, _>(
            |order, process| order.vip || process.attribute("all_orders").is_some(),
        )]);

        let (customer, _) =
            evaluate_and_commit(&strategy, Artifact::object(Customer { name: "bob" }));
        assert!(customer.is_no_change());

        let (regular, _) = evaluate_and_commit(&strategy, Artifact::Object(order(3)));
        assert!(regular.is_no_change());

        let (vip, _) = evaluate_and_commit(&strategy, Artifact::object(Order { id: 4, vip: true }));
        assert_eq!(vip.additions().len(), 1);
    }

    #[test]
    fn test_auto_discovery_keeps_single_binding() {
        let strategy = DomainToolInjection::auto_discovery();

        let (first, _) = evaluate_and_commit(&strategy, Artifact::Object(order(1)));
        let (second, released) =
            evaluate_and_commit(&strategy, Artifact::object(Customer { name: "cy" }));

        assert_eq!(second.additions().len(), 2);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id(), first.additions()[0].id());

        let tracker = strategy.tracker();
        let tracker = tracker.lock().unwrap();
        assert!(tracker.bound_instance::<Order>().is_none());
        assert!(tracker.bound_instance::<Customer>().is_some());
        assert_eq!(tracker.bound_artifacts().len(), 1);
    }

    #[test]
    fn test_auto_discovery_ignores_objects_without_tools() {
        let strategy = DomainToolInjection::auto_discovery();
        let (result, _) = evaluate_and_commit(&strategy, Artifact::object(Inert));
        assert!(result.is_no_change());
    }

    #[test]
    fn test_collection_members_bind_individually() {
        let strategy = DomainToolInjection::registered([DomainToolSource::of::<Order>()]);
        let (result, _) = evaluate_and_commit(
            &strategy,
            Artifact::collection(vec![
                Artifact::Object(order(1)),
                Artifact::object(Inert),
                Artifact::Object(order(2)),
            ]),
        );

        assert_eq!(result.additions().len(), 1);
        let tracker = strategy.tracker();
        assert_eq!(tracker.lock().unwrap().bound_instance::<Order>().map(|o| o.id), Some(2));
    }

    #[test]
    fn test_extracted_tools_carry_binding() {
        let mut tracker = DomainToolTracker::auto_discovery();
        let object = order(9);
        let tools = tracker
            .try_bind(&object, &ProcessContext::default())
            .expect("binds");

        let binding = tools[0].binding().expect("binding");
        assert_eq!(binding.domain_type, DomainType::of::<Order>());
        assert!(Arc::ptr_eq(&binding.instance, &object));
        assert!(tracker.try_bind(&object, &ProcessContext::default()).is_none());

        tracker.clear();
        assert!(tracker.bound_artifacts().is_empty());
    }
}
