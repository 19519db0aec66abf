//! Tree descriptions produced by application code.
//!
//! Elements are immutable values. A render builds a fresh description and the
//! reconciler diffs it against the committed tree; reference identity of
//! [`Props`] is what lets an unchanged subtree be skipped.

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ReconcileError;
use crate::hooks::Hooks;
use crate::host::HostId;

/// Stable identity of a child among its siblings.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(Rc::from(value))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key(Rc::from(value.to_string()))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key(Rc::from(value.to_string()))
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key(Rc::from(value.to_string()))
    }
}

/// One child slot of a description.
#[derive(Clone, Default)]
pub enum Child {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    List(Vec<Child>),
}

impl Child {
    /// Text child from anything printable; numbers become text nodes.
    pub fn text(value: impl fmt::Display) -> Self {
        Child::Text(Rc::from(value.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Child::Empty)
    }

    /// Identity comparison: equal text, or elements of the same kind and key
    /// sharing the same props allocation.
    pub fn same(&self, other: &Child) -> bool {
        match (self, other) {
            (Child::Empty, Child::Empty) => true,
            (Child::Text(a), Child::Text(b)) => a == b,
            (Child::Element(a), Child::Element(b)) => a.same(b),
            (Child::List(a), Child::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Empty => f.write_str("Empty"),
            Child::Text(text) => write!(f, "Text({text:?})"),
            Child::Element(element) => fmt::Debug::fmt(element, f),
            Child::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<Element> for Child {
    fn from(value: Element) -> Self {
        Child::Element(value)
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Child::Text(Rc::from(value))
    }
}

impl From<String> for Child {
    fn from(value: String) -> Self {
        Child::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for Child {
    fn from(value: Rc<str>) -> Self {
        Child::Text(value)
    }
}

impl From<i64> for Child {
    fn from(value: i64) -> Self {
        Child::text(value)
    }
}

impl From<i32> for Child {
    fn from(value: i32) -> Self {
        Child::text(value)
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(value: Vec<T>) -> Self {
        Child::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(value: Option<T>) -> Self {
        value.map_or(Child::Empty, Into::into)
    }
}

/// A typed attribute value.
#[derive(Clone)]
pub enum PropValue {
    Text(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Callback(Rc<dyn Fn()>),
    Children(Rc<Child>),
    Any(Rc<dyn Any>),
}

impl PropValue {
    pub fn callback(f: impl Fn() + 'static) -> Self {
        PropValue::Callback(Rc::new(f))
    }

    pub fn any<T: 'static>(value: T) -> Self {
        PropValue::Any(Rc::new(value))
    }
}

/// Scalars compare by value, everything else by allocation.
impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Text(a), PropValue::Text(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Callback(a), PropValue::Callback(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (PropValue::Children(a), PropValue::Children(b)) => Rc::ptr_eq(a, b),
            (PropValue::Any(a), PropValue::Any(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(text) => write!(f, "{text:?}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Callback(_) => f.write_str("<callback>"),
            PropValue::Children(child) => write!(f, "{child:?}"),
            PropValue::Any(_) => f.write_str("<any>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Text(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

#[derive(Clone, Default)]
struct PropsInner {
    attrs: BTreeMap<Rc<str>, PropValue>,
    children: Child,
}

/// Shared, immutable attribute set plus children.
#[derive(Clone, Default)]
pub struct Props(Rc<PropsInner>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_children(children: Child) -> Self {
        Props(Rc::new(PropsInner {
            attrs: BTreeMap::new(),
            children,
        }))
    }

    pub(crate) fn with_attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.inner_mut().attrs.insert(Rc::from(name), value.into());
        self
    }

    pub fn ptr_eq(a: &Props, b: &Props) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Attribute-wise equality, ignoring children.
    pub fn same_attributes(&self, other: &Props) -> bool {
        Props::ptr_eq(self, other) || self.0.attrs == other.0.attrs
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.attrs.get(name)
    }

    pub fn str_attr(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(PropValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn int_attr(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(PropValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn float_attr(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(PropValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool_attr(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(PropValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn callback(&self, name: &str) -> Option<Rc<dyn Fn()>> {
        match self.get(name) {
            Some(PropValue::Callback(callback)) => Some(callback.clone()),
            _ => None,
        }
    }

    pub fn downcast<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
        match self.get(name) {
            Some(PropValue::Any(value)) => value.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.attrs.iter().map(|(name, value)| (&**name, value))
    }

    pub fn children(&self) -> &Child {
        &self.0.children
    }

    /// Content of a text node.
    pub fn text_content(&self) -> &str {
        match &self.0.children {
            Child::Text(text) => text,
            _ => "",
        }
    }

    fn inner_mut(&mut self) -> &mut PropsInner {
        Rc::make_mut(&mut self.0)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.attributes()).finish()
    }
}

/// Object ref: a cell the commit phase fills with the host id.
#[derive(Clone, Default)]
pub struct RefObject(Rc<Cell<Option<HostId>>>);

impl RefObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<HostId> {
        self.0.get()
    }

    pub fn ptr_eq(&self, other: &RefObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RefObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefObject").field(&self.0.get()).finish()
    }
}

/// Where a host element reports its host object.
#[derive(Clone)]
pub enum ElementRef {
    Callback(Rc<dyn Fn(Option<HostId>)>),
    Object(RefObject),
}

impl ElementRef {
    pub fn callback(f: impl Fn(Option<HostId>) + 'static) -> Self {
        ElementRef::Callback(Rc::new(f))
    }

    pub(crate) fn same(&self, other: &ElementRef) -> bool {
        match (self, other) {
            (ElementRef::Callback(a), ElementRef::Callback(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (ElementRef::Object(a), ElementRef::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub(crate) fn set(&self, host: Option<HostId>) {
        match self {
            ElementRef::Callback(callback) => callback(host),
            ElementRef::Object(object) => object.0.set(host),
        }
    }
}

impl From<RefObject> for ElementRef {
    fn from(value: RefObject) -> Self {
        ElementRef::Object(value)
    }
}

pub(crate) fn same_ref(a: Option<&ElementRef>, b: Option<&ElementRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same(b),
        _ => false,
    }
}

type RenderFn = dyn Fn(&mut Hooks<'_>, &Props) -> Result<Child, ReconcileError>;

/// A component function. Two components are the same kind when they were
/// built from the same function type.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    type_id: TypeId,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&mut Hooks<'_>, &Props) -> Result<Child, ReconcileError> + 'static,
    {
        Self {
            name,
            type_id: TypeId::of::<F>(),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn same_kind(&self, other: &Component) -> bool {
        self.type_id == other.type_id
    }

    pub(crate) fn call(
        &self,
        hooks: &mut Hooks<'_>,
        props: &Props,
    ) -> Result<Child, ReconcileError> {
        (self.render)(hooks, props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

/// A value made available to a subtree by a provider element.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T: 'static> Context<T> {
    pub fn new(default: T) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            default: Rc::new(default),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn default_value(&self) -> Rc<T> {
        self.default.clone()
    }
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ElementKind {
    Host(Rc<str>),
    Component(Component),
    Fragment,
    Provider(ContextId),
    Suspense,
}

pub(crate) const PROVIDER_VALUE: &str = "value";
pub(crate) const SUSPENSE_SUSPENDED: &str = "suspended";
pub(crate) const SUSPENSE_FALLBACK: &str = "fallback";
pub(crate) const OFFSCREEN_HIDDEN: &str = "hidden";

/// A node description.
#[derive(Clone)]
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    pub(crate) node_ref: Option<ElementRef>,
    pub(crate) props: Props,
}

impl Element {
    fn with_kind(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            node_ref: None,
            props: Props::new(),
        }
    }

    pub fn host(tag: impl Into<Rc<str>>) -> Self {
        Self::with_kind(ElementKind::Host(tag.into()))
    }

    pub fn component(component: &Component) -> Self {
        Self::with_kind(ElementKind::Component(component.clone()))
    }

    pub fn fragment(children: impl Into<Child>) -> Self {
        Self::with_kind(ElementKind::Fragment).children(children)
    }

    /// Makes `value` visible to [`Hooks::use_context`] below this element.
    /// Consumers see a change when a different `Rc` is passed.
    pub fn provider<T: 'static>(
        context: &Context<T>,
        value: Rc<T>,
        children: impl Into<Child>,
    ) -> Self {
        let value: Rc<dyn Any> = value;
        Self::with_kind(ElementKind::Provider(context.id()))
            .prop(PROVIDER_VALUE, PropValue::Any(value))
            .children(children)
    }

    /// Shows `children`, or `fallback` while [`Element::suspended`] is set.
    /// The hidden children keep their state.
    pub fn suspense(fallback: impl Into<Child>, children: impl Into<Child>) -> Self {
        Self::with_kind(ElementKind::Suspense)
            .prop(SUSPENSE_FALLBACK, PropValue::Children(Rc::new(fallback.into())))
            .prop(SUSPENSE_SUSPENDED, false)
            .children(children)
    }

    pub fn suspended(self, suspended: bool) -> Self {
        self.prop(SUSPENSE_SUSPENDED, suspended)
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        self.props
            .inner_mut()
            .attrs
            .insert(name.into(), value.into());
        self
    }

    /// Appends one child.
    pub fn child(mut self, child: impl Into<Child>) -> Self {
        let child = child.into();
        let inner = self.props.inner_mut();
        inner.children = match std::mem::take(&mut inner.children) {
            Child::Empty => child,
            Child::List(mut items) => {
                items.push(child);
                Child::List(items)
            }
            single => Child::List(vec![single, child]),
        };
        self
    }

    /// Replaces all children.
    pub fn children(mut self, children: impl Into<Child>) -> Self {
        self.props.inner_mut().children = children.into();
        self
    }

    pub fn with_ref(mut self, node_ref: impl Into<ElementRef>) -> Self {
        self.node_ref = Some(node_ref.into());
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn key_ref(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    fn same(&self, other: &Element) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Component(a), ElementKind::Component(b)) => a.same_kind(b),
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            (ElementKind::Provider(a), ElementKind::Provider(b)) => a == b,
            (ElementKind::Suspense, ElementKind::Suspense) => true,
            _ => false,
        };
        same_kind
            && self.key == other.key
            && Props::ptr_eq(&self.props, &other.props)
            && same_ref(self.node_ref.as_ref(), other.node_ref.as_ref())
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Element");
        out.field("kind", &self.kind);
        if let Some(key) = &self.key {
            out.field("key", key);
        }
        out.field("props", &self.props)
            .field("children", self.props.children())
            .finish()
    }
}
