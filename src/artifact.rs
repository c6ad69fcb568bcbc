//! Typed artifacts carried by tool results.
//!
//! A tool may hand back a domain object alongside its textual content. Objects
//! that want to expose their own operations to the model implement
//! [`DomainObject::tools`], an explicit, once-per-instance registration step
//! that produces plain [`Tool`] values bound to that instance.

use crate::tools::Tool;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type-erasure helpers, implemented for every `'static` type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// An object that can travel as a tool artifact and be bound as a tool source.
///
/// ```rust
/// use open_agent_loop::{DomainObject, Tool, tool};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// struct Order {
///     id: u64,
/// }
///
/// impl DomainObject for Order {
///     fn tools(self: Arc<Self>) -> Vec<Tool> {
///         let order = Arc::clone(&self);
///         vec![tool("order_status", "Status of the bound order").build(move |_| {
///             let id = order.id;
///             async move { Ok(json!({"order": id, "status": "shipped"})) }
///         })]
///     }
/// }
/// ```
pub trait DomainObject: AsAny {
    /// Tools exposing this instance's operations. Empty means "no callable
    /// operations", which keeps the object out of auto-discovery.
    fn tools(self: Arc<Self>) -> Vec<Tool> {
        Vec::new()
    }
}

/// Runtime type key of a domain object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainType {
    id: TypeId,
    name: &'static str,
}

impl DomainType {
    pub fn of<T: DomainObject>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn of_val(object: &dyn DomainObject) -> Self {
        Self {
            id: object.as_any().type_id(),
            name: object.type_name(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Downcast a shared domain object to its concrete type.
pub fn downcast_object<T: DomainObject>(object: &Arc<dyn DomainObject>) -> Option<Arc<T>> {
    Arc::clone(object).into_any_arc().downcast::<T>().ok()
}

/// Artifact attached to a tool result.
#[derive(Clone)]
pub enum Artifact {
    Object(Arc<dyn DomainObject>),
    /// Members are considered one by one; the collection itself never binds.
    Collection(Vec<Artifact>),
}

impl Artifact {
    pub fn object<T: DomainObject>(value: T) -> Self {
        Artifact::Object(Arc::new(value))
    }

    pub fn collection(items: impl IntoIterator<Item = Artifact>) -> Self {
        Artifact::Collection(items.into_iter().collect())
    }

    /// Every object in this artifact, depth-first, in insertion order.
    pub fn objects(&self) -> Vec<Arc<dyn DomainObject>> {
        let mut out = Vec::new();
        self.collect_objects(&mut out);
        out
    }

    fn collect_objects(&self, out: &mut Vec<Arc<dyn DomainObject>>) {
        match self {
            Artifact::Object(object) => out.push(Arc::clone(object)),
            Artifact::Collection(items) => {
                for item in items {
                    item.collect_objects(out);
                }
            }
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Object(object) => f
                .debug_tuple("Object")
                .field(&DomainType::of_val(object.as_ref()).name())
                .finish(),
            Artifact::Collection(items) => f.debug_tuple("Collection").field(items).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Invoice {
        total: u32,
    }
    impl DomainObject for Invoice {}

    struct Receipt;
    impl DomainObject for Receipt {}

    #[test]
    fn test_domain_type_of_val_matches_static_type() {
        let object: Arc<dyn DomainObject> = Arc::new(Invoice { total: 10 });
        assert_eq!(DomainType::of_val(object.as_ref()), DomainType::of::<Invoice>());
        assert_ne!(DomainType::of_val(object.as_ref()), DomainType::of::<Receipt>());
        assert!(DomainType::of::<Invoice>().name().ends_with("Invoice"));
    }

    #[test]
    fn test_downcast_object() {
        let object: Arc<dyn DomainObject> = Arc::new(Invoice { total: 42 });
        let invoice = downcast_object::<Invoice>(&object).expect("invoice");
        assert_eq!(invoice.total, 42);
        assert!(downcast_object::<Receipt>(&object).is_none());
    }

    #[test]
    fn test_collection_flattens_in_order() {
        let artifact = Artifact::collection(vec![
            Artifact::object(Invoice { total: 1 }),
            Artifact::collection(vec![Artifact::object(Receipt)]),
            Artifact::object(Invoice { total: 2 }),
        ]);
        let objects = artifact.objects();
        assert_eq!(objects.len(), 3);
        assert_eq!(DomainType::of_val(objects[1].as_ref()), DomainType::of::<Receipt>());
        assert_eq!(downcast_object::<Invoice>(&objects[2]).map(|i| i.total), Some(2));
    }

    #[test]
    fn test_default_domain_object_has_no_tools() {
        assert!(Arc::new(Receipt).tools().is_empty());
    }
}
