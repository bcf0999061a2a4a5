//! Shared host composites.
//!
//! Every composite is a cheap-to-clone reference to storage shared between
//! the host and any script proxies created for it. Equality on these types
//! is identity: two references are equal when they point at the same
//! storage.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use indexmap::IndexMap;

use crate::error::{BridgeError, BridgeResult};
use crate::kind::{BridgeKind, TypeHint};
use crate::value::{HostValue, Unmarshal};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== Sequence ====================

/// A growable sequence sharing one element type.
#[derive(Clone)]
pub struct SequenceRef {
    elem: TypeHint,
    items: Arc<RwLock<Vec<HostValue>>>,
}

impl SequenceRef {
    /// Create a sequence with an explicit element hint.
    pub fn new(elem: TypeHint, items: impl IntoIterator<Item = HostValue>) -> Self {
        Self {
            elem,
            items: Arc::new(RwLock::new(items.into_iter().collect())),
        }
    }

    /// Create a sequence of a typed host element.
    pub fn of<T: Into<HostValue> + Unmarshal>(items: impl IntoIterator<Item = T>) -> Self {
        Self::new(T::HINT, items.into_iter().map(Into::into))
    }

    /// Element hint used when scripts write into the sequence.
    pub fn element_hint(&self) -> TypeHint {
        self.elem
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.items).is_empty()
    }

    /// Allocated capacity of the backing storage.
    pub fn capacity(&self) -> usize {
        read(&self.items).capacity()
    }

    /// Get an element by zero-based index.
    pub fn get(&self, index: usize) -> Option<HostValue> {
        read(&self.items).get(index).cloned()
    }

    /// Replace an element by zero-based index.
    pub fn set(&self, index: usize, value: HostValue) -> BridgeResult<()> {
        let mut items = write(&self.items);
        let len = items.len();
        let slot = items.get_mut(index).ok_or(BridgeError::OutOfRange {
            index: index as i64 + 1,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    /// Append an element in place.
    pub fn push(&self, value: HostValue) {
        write(&self.items).push(value);
    }

    /// Copy of the current elements.
    pub fn snapshot(&self) -> Vec<HostValue> {
        read(&self.items).clone()
    }

    /// Copy of the current elements as a typed vector.
    pub fn to_vec<T: Unmarshal>(&self) -> BridgeResult<Vec<T>> {
        self.snapshot().into_iter().map(T::unmarshal).collect()
    }

    /// A new sequence holding these elements followed by `values`.
    ///
    /// The receiver is left untouched.
    pub fn appended(&self, values: impl IntoIterator<Item = HostValue>) -> Self {
        let items = read(&self.items);
        let values = values.into_iter();
        let mut grown = Vec::with_capacity(items.len() + values.size_hint().0);
        grown.extend(items.iter().cloned());
        grown.extend(values);
        Self {
            elem: self.elem,
            items: Arc::new(RwLock::new(grown)),
        }
    }

    /// Whether both references share storage.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl PartialEq for SequenceRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for SequenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceRef")
            .field("elem", &self.elem)
            .field("items", &*read(&self.items))
            .finish()
    }
}

// ==================== Mapping ====================

/// A string-keyed mapping preserving insertion order.
#[derive(Clone)]
pub struct MappingRef {
    elem: TypeHint,
    entries: Arc<RwLock<IndexMap<String, HostValue>>>,
}

impl MappingRef {
    /// Create a mapping with an explicit value hint.
    pub fn new<K: Into<String>>(
        elem: TypeHint,
        entries: impl IntoIterator<Item = (K, HostValue)>,
    ) -> Self {
        Self {
            elem,
            entries: Arc::new(RwLock::new(
                entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            )),
        }
    }

    /// Value hint used when scripts write into the mapping.
    pub fn element_hint(&self) -> TypeHint {
        self.elem
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }

    pub fn get(&self, key: &str) -> Option<HostValue> {
        read(&self.entries).get(key).cloned()
    }

    /// Entry at an insertion-order position.
    pub fn get_index(&self, index: usize) -> Option<(String, HostValue)> {
        read(&self.entries)
            .get_index(index)
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn insert(&self, key: impl Into<String>, value: HostValue) -> Option<HostValue> {
        write(&self.entries).insert(key.into(), value)
    }

    /// Remove an entry, keeping the order of the others.
    pub fn remove(&self, key: &str) -> Option<HostValue> {
        write(&self.entries).shift_remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        read(&self.entries).keys().cloned().collect()
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl PartialEq for MappingRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for MappingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRef")
            .field("elem", &self.elem)
            .field("entries", &*read(&self.entries))
            .finish()
    }
}

// ==================== Channel ====================

struct ChannelState {
    buffer: VecDeque<HostValue>,
    closed: bool,
    /// Values handed to a receiver, counted for unbuffered senders.
    taken: u64,
    /// Values offered by unbuffered senders.
    offered: u64,
}

struct ChannelInner {
    capacity: usize,
    state: Mutex<ChannelState>,
    changed: Condvar,
}

impl ChannelInner {
    fn wait<'a>(&self, guard: MutexGuard<'a, ChannelState>) -> MutexGuard<'a, ChannelState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A channel shared between host threads and scripts.
///
/// With a capacity, `send` blocks while the buffer is full. A capacity of
/// zero makes the channel unbuffered: `send` blocks until a receiver has
/// taken the value. `receive` blocks while the channel is empty and open.
///
/// Closing is irreversible. Later sends fail, and so does any send still
/// blocked when the close happens. Receives drain what is already buffered
/// and then report the channel as closed.
#[derive(Clone)]
pub struct ChannelRef {
    elem: TypeHint,
    inner: Arc<ChannelInner>,
}

impl ChannelRef {
    /// Create a channel buffering up to `capacity` elements; zero is unbuffered.
    pub fn new(elem: TypeHint, capacity: usize) -> Self {
        Self {
            elem,
            inner: Arc::new(ChannelInner {
                capacity,
                state: Mutex::new(ChannelState {
                    buffer: VecDeque::with_capacity(capacity),
                    closed: false,
                    taken: 0,
                    offered: 0,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Element hint used when scripts send into the channel.
    pub fn element_hint(&self) -> TypeHint {
        self.elem
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of elements currently buffered. Always zero when unbuffered.
    pub fn len(&self) -> usize {
        if self.inner.capacity == 0 {
            return 0;
        }
        lock(&self.inner.state).buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.state).closed
    }

    /// Send a value, blocking until it is buffered or taken by a receiver.
    pub fn send(&self, value: HostValue) -> BridgeResult<()> {
        let closed = BridgeError::ChannelClosed { operation: "send" };
        let inner = &*self.inner;
        let mut state = lock(&inner.state);

        // Unbuffered channels hold at most one offered value at a time.
        let room = inner.capacity.max(1);
        while !state.closed && state.buffer.len() >= room {
            state = inner.wait(state);
        }
        if state.closed {
            return Err(closed);
        }

        state.buffer.push_back(value);
        inner.changed.notify_all();
        if inner.capacity > 0 {
            return Ok(());
        }

        state.offered += 1;
        let ticket = state.offered;
        while state.taken < ticket && !state.closed {
            state = inner.wait(state);
        }
        if state.taken >= ticket { Ok(()) } else { Err(closed) }
    }

    /// Receive a value, blocking until one is available.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub fn receive(&self) -> Option<HostValue> {
        let inner = &*self.inner;
        let mut state = lock(&inner.state);
        loop {
            if let Some(value) = Self::take(inner, &mut state) {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            state = inner.wait(state);
        }
    }

    /// Receive a value if one is ready.
    pub fn try_receive(&self) -> Option<HostValue> {
        let mut state = lock(&self.inner.state);
        Self::take(&self.inner, &mut state)
    }

    fn take(inner: &ChannelInner, state: &mut ChannelState) -> Option<HostValue> {
        let value = state.buffer.pop_front()?;
        state.taken += 1;
        inner.changed.notify_all();
        Some(value)
    }

    /// Close the channel. Closing twice is an error.
    pub fn close(&self) -> BridgeResult<()> {
        let mut state = lock(&self.inner.state);
        if state.closed {
            return Err(BridgeError::ChannelClosed { operation: "close" });
        }
        state.closed = true;
        // An offered value was never buffered; its sender fails instead.
        if self.inner.capacity == 0 {
            state.buffer.clear();
        }
        self.inner.changed.notify_all();
        Ok(())
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ChannelRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRef")
            .field("elem", &self.elem)
            .field("capacity", &self.inner.capacity)
            .field("len", &self.len())
            .finish()
    }
}

// ==================== Struct ====================

/// Signature of a struct method body. The first argument is the receiver.
pub type MethodFn = dyn Fn(&StructRef, Vec<HostValue>) -> BridgeResult<HostValue> + Send + Sync;

/// A method attached to a [`StructType`].
#[derive(Clone)]
pub struct Method {
    name: Arc<str>,
    params: Arc<[TypeHint]>,
    func: Arc<MethodFn>,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeHint] {
        &self.params
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A method paired with the struct it was looked up on.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    receiver: StructRef,
    method: Method,
}

impl BoundMethod {
    pub fn name(&self) -> &str {
        self.method.name()
    }

    pub fn params(&self) -> &[TypeHint] {
        self.method.params()
    }

    pub fn call(&self, args: Vec<HostValue>) -> BridgeResult<HostValue> {
        (self.method.func)(&self.receiver, args)
    }
}

/// Field layout and method sets shared by every instance of a struct.
///
/// Value methods are visible through every handle; pointer methods only
/// through mutable handles.
#[derive(Debug)]
pub struct StructType {
    name: String,
    fields: IndexMap<String, TypeHint>,
    methods: IndexMap<String, Method>,
    pointer_methods: IndexMap<String, Method>,
}

impl StructType {
    /// Start describing a struct type.
    pub fn builder(name: impl Into<String>) -> StructTypeBuilder {
        StructTypeBuilder {
            ty: StructType {
                name: name.into(),
                fields: IndexMap::new(),
                methods: IndexMap::new(),
                pointer_methods: IndexMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_hint(&self, name: &str) -> Option<TypeHint> {
        self.fields.get(name).copied()
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn pointer_method(&self, name: &str) -> Option<&Method> {
        self.pointer_methods.get(name)
    }
}

/// Builder for [`StructType`].
pub struct StructTypeBuilder {
    ty: StructType,
}

impl StructTypeBuilder {
    /// Declare a field and its hint.
    pub fn field(mut self, name: impl Into<String>, hint: impl Into<TypeHint>) -> Self {
        self.ty.fields.insert(name.into(), hint.into());
        self
    }

    /// Add a method callable through any handle.
    pub fn method<F>(mut self, name: &str, params: impl Into<Vec<TypeHint>>, func: F) -> Self
    where
        F: Fn(&StructRef, Vec<HostValue>) -> BridgeResult<HostValue> + Send + Sync + 'static,
    {
        self.ty
            .methods
            .insert(name.to_string(), make_method(name, params, func));
        self
    }

    /// Add a method callable only through mutable handles.
    pub fn pointer_method<F>(mut self, name: &str, params: impl Into<Vec<TypeHint>>, func: F) -> Self
    where
        F: Fn(&StructRef, Vec<HostValue>) -> BridgeResult<HostValue> + Send + Sync + 'static,
    {
        self.ty
            .pointer_methods
            .insert(name.to_string(), make_method(name, params, func));
        self
    }

    pub fn build(self) -> Arc<StructType> {
        Arc::new(self.ty)
    }
}

fn make_method<F>(name: &str, params: impl Into<Vec<TypeHint>>, func: F) -> Method
where
    F: Fn(&StructRef, Vec<HostValue>) -> BridgeResult<HostValue> + Send + Sync + 'static,
{
    Method {
        name: Arc::from(name),
        params: Arc::from(params.into()),
        func: Arc::new(func),
    }
}

/// An instance of a [`StructType`].
#[derive(Clone)]
pub struct StructRef {
    ty: Arc<StructType>,
    fields: Arc<RwLock<IndexMap<String, HostValue>>>,
}

impl StructRef {
    /// Create an instance with every field set to its zero value.
    pub fn new(ty: Arc<StructType>) -> Self {
        let fields = ty
            .fields
            .iter()
            .map(|(name, hint)| (name.clone(), HostValue::zero(*hint)))
            .collect();
        Self {
            ty,
            fields: Arc::new(RwLock::new(fields)),
        }
    }

    /// Create an instance and assign the given fields.
    pub fn with_fields<K: AsRef<str>>(
        ty: Arc<StructType>,
        fields: impl IntoIterator<Item = (K, HostValue)>,
    ) -> BridgeResult<Self> {
        let instance = Self::new(ty);
        for (name, value) in fields {
            instance.set_field(name.as_ref(), value)?;
        }
        Ok(instance)
    }

    pub fn struct_type(&self) -> &Arc<StructType> {
        &self.ty
    }

    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    pub fn field(&self, name: &str) -> Option<HostValue> {
        read(&self.fields).get(name).cloned()
    }

    /// Field at a declaration-order position.
    pub fn field_at(&self, index: usize) -> Option<(String, HostValue)> {
        read(&self.fields)
            .get_index(index)
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Assign a declared field.
    pub fn set_field(&self, name: &str, value: HostValue) -> BridgeResult<()> {
        match write(&self.fields).get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(BridgeError::InvalidKey {
                kind: BridgeKind::StructLike,
                key: format!("{}.{name}", self.ty.name()),
            }),
        }
    }

    pub fn field_count(&self) -> usize {
        read(&self.fields).len()
    }

    /// Look up a method, value form first, then pointer form if allowed.
    pub fn bind(&self, name: &str, include_pointer_methods: bool) -> Option<BoundMethod> {
        let method = self.ty.method(name).or_else(|| {
            include_pointer_methods
                .then(|| self.ty.pointer_method(name))
                .flatten()
        })?;
        Some(BoundMethod {
            receiver: self.clone(),
            method: method.clone(),
        })
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

impl PartialEq for StructRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for StructRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructRef")
            .field("type", &self.ty.name)
            .field("fields", &*read(&self.fields))
            .finish()
    }
}

// ==================== Pointer ====================

/// A mutable cell holding another value.
#[derive(Clone)]
pub struct PointerRef {
    hint: TypeHint,
    cell: Arc<RwLock<HostValue>>,
}

impl PointerRef {
    /// Create a pointer whose pointee hint is taken from the initial value.
    pub fn new(value: HostValue) -> Self {
        Self::with_hint(value.hint(), value)
    }

    /// Create a pointer with an explicit pointee hint.
    pub fn with_hint(hint: TypeHint, value: HostValue) -> Self {
        Self {
            hint,
            cell: Arc::new(RwLock::new(value)),
        }
    }

    /// Hint used when scripts store through the pointer.
    pub fn pointee_hint(&self) -> TypeHint {
        self.hint
    }

    pub fn load(&self) -> HostValue {
        read(&self.cell).clone()
    }

    pub fn store(&self, value: HostValue) {
        *write(&self.cell) = value;
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for PointerRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for PointerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerRef")
            .field("hint", &self.hint)
            .field("value", &*read(&self.cell))
            .finish()
    }
}
