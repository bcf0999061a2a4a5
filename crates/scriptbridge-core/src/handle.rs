//! Proxy handles over host composites.
//!
//! A [`Handle`] is what a script holds when it receives a host composite: a
//! reference to the shared storage plus a mutability tag. Value handles can
//! observe the composite; only mutable handles (obtained through a pointer)
//! can write to it. All capability operations live here so they can be
//! exercised without an interpreter.

use std::fmt;

use crate::composite::{BoundMethod, ChannelRef, MappingRef, PointerRef, SequenceRef, StructRef};
use crate::error::{BridgeError, BridgeResult};
use crate::kind::{BridgeKind, TypeHint};
use crate::value::HostValue;

/// Key used to index a composite from a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// One-based position.
    Index(i64),
    /// Field, entry or method name.
    Name(String),
}

impl Key {
    /// The key as a mapping entry name.
    fn entry_name(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// The composite a handle refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Sequence(SequenceRef),
    Mapping(MappingRef),
    Channel(ChannelRef),
    Struct(StructRef),
    Pointer(PointerRef),
}

/// Built-in operations exposed by name on sequences and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Append,
    Capacity,
    Send,
    Receive,
    Close,
}

impl Builtin {
    fn lookup(kind: BridgeKind, name: &str) -> Option<Self> {
        match (kind, name) {
            (BridgeKind::Sequence, "append") => Some(Self::Append),
            (BridgeKind::Sequence | BridgeKind::Channel, "capacity") => Some(Self::Capacity),
            (BridgeKind::Channel, "send") => Some(Self::Send),
            (BridgeKind::Channel, "receive") => Some(Self::Receive),
            (BridgeKind::Channel, "close") => Some(Self::Close),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Capacity => "capacity",
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Close => "close",
        }
    }
}

/// Result of an index read.
#[derive(Debug, Clone)]
pub enum Member {
    /// An element, entry or field.
    Value(HostValue),
    /// A struct method bound to its receiver.
    Method(BoundMethod),
    /// A built-in operation of the composite.
    Builtin(Builtin),
}

/// A script-visible handle on a host composite.
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    target: Target,
    mutable: bool,
}

impl Handle {
    /// A read-only handle.
    pub fn value(target: Target) -> Self {
        Self {
            target,
            mutable: false,
        }
    }

    /// A handle that may mutate its target.
    pub fn mutable(target: Target) -> Self {
        Self {
            target,
            mutable: true,
        }
    }

    /// Build the handle a script should see for a host value.
    ///
    /// Bare composites become value handles. A pointer to a composite
    /// becomes a mutable handle on the pointee; a pointer to anything else
    /// stays pointer-like. Primitives and functions have no handle.
    pub fn from_host(value: &HostValue) -> Option<Self> {
        let handle = match value {
            HostValue::Sequence(s) => Self::value(Target::Sequence(s.clone())),
            HostValue::Mapping(m) => Self::value(Target::Mapping(m.clone())),
            HostValue::Channel(c) => Self::value(Target::Channel(c.clone())),
            HostValue::Struct(s) => Self::value(Target::Struct(s.clone())),
            HostValue::Pointer(p) => match p.load() {
                HostValue::Sequence(s) => Self::mutable(Target::Sequence(s)),
                HostValue::Mapping(m) => Self::mutable(Target::Mapping(m)),
                HostValue::Channel(c) => Self::mutable(Target::Channel(c)),
                HostValue::Struct(s) => Self::mutable(Target::Struct(s)),
                _ => Self::mutable(Target::Pointer(p.clone())),
            },
            HostValue::Nil
            | HostValue::Bool(_)
            | HostValue::Int(_)
            | HostValue::UInt(_)
            | HostValue::Float(_)
            | HostValue::String(_)
            | HostValue::Function(_) => return None,
        };
        Some(handle)
    }

    pub fn kind(&self) -> BridgeKind {
        match &self.target {
            Target::Sequence(_) => BridgeKind::Sequence,
            Target::Mapping(_) => BridgeKind::Mapping,
            Target::Channel(_) => BridgeKind::Channel,
            Target::Struct(_) => BridgeKind::StructLike,
            Target::Pointer(_) => BridgeKind::PointerLike,
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Fail with [`BridgeError::ValueHandle`] unless this handle is mutable.
    pub fn ensure_mutable(&self, operation: &'static str) -> BridgeResult<()> {
        if self.mutable {
            Ok(())
        } else {
            Err(BridgeError::ValueHandle { operation })
        }
    }

    fn unsupported(&self, operation: &'static str) -> BridgeError {
        BridgeError::Unsupported {
            kind: self.kind(),
            operation,
        }
    }

    fn invalid_key(&self, key: &Key) -> BridgeError {
        BridgeError::InvalidKey {
            kind: self.kind(),
            key: key.to_string(),
        }
    }

    /// Composite elements reached through a mutable handle stay mutable.
    fn expose(&self, value: HostValue) -> HostValue {
        if self.mutable && value.kind().is_composite() && !matches!(value, HostValue::Pointer(_)) {
            HostValue::pointer(value)
        } else {
            value
        }
    }

    /// Check a one-based sequence index against the current length.
    fn position(index: i64, len: usize) -> BridgeResult<usize> {
        if index < 1 || index as u64 > len as u64 {
            return Err(BridgeError::OutOfRange { index, len });
        }
        Ok(index as usize - 1)
    }

    /// Read a member.
    ///
    /// `Ok(None)` means "not found" and is never an error. Out-of-range
    /// sequence positions and malformed keys are errors.
    pub fn get(&self, key: &Key) -> BridgeResult<Option<Member>> {
        match (&self.target, key) {
            (Target::Sequence(seq), Key::Index(i)) => {
                let pos = Self::position(*i, seq.len())?;
                Ok(seq.get(pos).map(|v| Member::Value(self.expose(v))))
            }
            (Target::Sequence(_) | Target::Channel(_), Key::Name(name)) => {
                Ok(Builtin::lookup(self.kind(), name).map(Member::Builtin))
            }
            (Target::Channel(_), Key::Index(_)) => Err(self.invalid_key(key)),
            (Target::Mapping(map), key) => Ok(map
                .get(&key.entry_name())
                .map(|v| Member::Value(self.expose(v)))),
            (Target::Struct(s), Key::Name(name)) => {
                if let Some(v) = s.field(name) {
                    return Ok(Some(Member::Value(self.expose(v))));
                }
                Ok(s.bind(name, self.mutable).map(Member::Method))
            }
            (Target::Struct(_), Key::Index(_)) => Ok(None),
            (Target::Pointer(_), _) => Err(self.unsupported("index")),
        }
    }

    /// The hint a value written at `key` is converted with.
    pub fn element_hint(&self, key: &Key) -> BridgeResult<TypeHint> {
        match (&self.target, key) {
            (Target::Sequence(seq), Key::Index(_)) => Ok(seq.element_hint()),
            (Target::Sequence(_), Key::Name(_)) => Err(self.invalid_key(key)),
            (Target::Mapping(map), _) => Ok(map.element_hint()),
            (Target::Channel(ch), _) => Ok(ch.element_hint()),
            (Target::Struct(s), Key::Name(name)) => s
                .struct_type()
                .field_hint(name)
                .ok_or_else(|| self.invalid_key(key)),
            (Target::Struct(_), Key::Index(_)) => Err(self.invalid_key(key)),
            (Target::Pointer(p), _) => Ok(p.pointee_hint()),
        }
    }

    /// Write a member. Assigning nil to a mapping entry removes it.
    pub fn set(&self, key: &Key, value: HostValue) -> BridgeResult<()> {
        self.ensure_mutable("index assignment")?;
        match (&self.target, key) {
            (Target::Sequence(seq), Key::Index(i)) => {
                let pos = Self::position(*i, seq.len())?;
                seq.set(pos, value)
            }
            (Target::Mapping(map), key) => {
                let name = key.entry_name();
                if value.is_nil() {
                    map.remove(&name);
                } else {
                    map.insert(name, value);
                }
                Ok(())
            }
            (Target::Struct(s), Key::Name(name)) => s.set_field(name, value),
            (Target::Sequence(_) | Target::Struct(_), _) => Err(self.invalid_key(key)),
            (Target::Channel(_) | Target::Pointer(_), _) => Err(self.unsupported("index assignment")),
        }
    }

    /// Length of a sequence or mapping, or the buffered count of a channel.
    pub fn len(&self) -> BridgeResult<usize> {
        match &self.target {
            Target::Sequence(seq) => Ok(seq.len()),
            Target::Mapping(map) => Ok(map.len()),
            Target::Channel(ch) => Ok(ch.len()),
            Target::Struct(_) | Target::Pointer(_) => Err(self.unsupported("length")),
        }
    }

    /// Identity comparison.
    ///
    /// Handles of different kinds are never equal; comparing a mutable
    /// handle with a value handle is an error.
    pub fn identical(&self, other: &Handle) -> BridgeResult<bool> {
        if self.kind() != other.kind() {
            return Ok(false);
        }
        if self.mutable != other.mutable {
            return Err(BridgeError::MixedHandles { kind: self.kind() });
        }
        Ok(match (&self.target, &other.target) {
            (Target::Sequence(a), Target::Sequence(b)) => a.same(b),
            (Target::Mapping(a), Target::Mapping(b)) => a.same(b),
            (Target::Channel(a), Target::Channel(b)) => a.same(b),
            (Target::Struct(a), Target::Struct(b)) => a.same(b),
            (Target::Pointer(a), Target::Pointer(b)) => a.same(b),
            _ => false,
        })
    }

    /// A fresh producer of `(key, value)` pairs.
    pub fn iter(&self) -> BridgeResult<HandleIter> {
        if let Target::Pointer(_) = self.target {
            return Err(self.unsupported("iteration"));
        }
        Ok(HandleIter {
            handle: self.clone(),
            position: 0,
        })
    }

    /// A new sequence handle with `values` appended. The receiver is left
    /// untouched.
    pub fn append(&self, values: Vec<HostValue>) -> BridgeResult<Handle> {
        match &self.target {
            Target::Sequence(seq) => Ok(Handle {
                target: Target::Sequence(seq.appended(values)),
                mutable: self.mutable,
            }),
            _ => Err(self.unsupported("append")),
        }
    }

    pub fn capacity(&self) -> BridgeResult<usize> {
        match &self.target {
            Target::Sequence(seq) => Ok(seq.capacity()),
            Target::Channel(ch) => Ok(ch.capacity()),
            _ => Err(self.unsupported("capacity")),
        }
    }

    /// Send on a channel, blocking while its buffer is full.
    pub fn send(&self, value: HostValue) -> BridgeResult<()> {
        self.ensure_mutable("send")?;
        match &self.target {
            Target::Channel(ch) => ch.send(value),
            _ => Err(self.unsupported("send")),
        }
    }

    /// Receive from a channel. `Ok(None)` means closed and drained.
    pub fn receive(&self) -> BridgeResult<Option<HostValue>> {
        match &self.target {
            Target::Channel(ch) => Ok(ch.receive()),
            _ => Err(self.unsupported("receive")),
        }
    }

    pub fn close(&self) -> BridgeResult<()> {
        self.ensure_mutable("close")?;
        match &self.target {
            Target::Channel(ch) => ch.close(),
            _ => Err(self.unsupported("close")),
        }
    }

    /// Read through a pointer.
    pub fn load(&self) -> BridgeResult<HostValue> {
        match &self.target {
            Target::Pointer(p) => Ok(p.load()),
            _ => Err(self.unsupported("dereference")),
        }
    }

    /// Write through a pointer.
    pub fn store(&self, value: HostValue) -> BridgeResult<()> {
        self.ensure_mutable("store")?;
        match &self.target {
            Target::Pointer(p) => {
                p.store(value);
                Ok(())
            }
            _ => Err(self.unsupported("store")),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = if self.mutable { "mutable" } else { "value" };
        match &self.target {
            Target::Struct(s) => write!(f, "{} ({access} handle)", s.type_name()),
            Target::Sequence(seq) => write!(f, "sequence<{}> ({access} handle)", seq.element_hint()),
            Target::Mapping(map) => write!(f, "mapping<{}> ({access} handle)", map.element_hint()),
            Target::Channel(ch) => write!(f, "channel<{}> ({access} handle)", ch.element_hint()),
            Target::Pointer(p) => write!(f, "pointer<{}>", p.pointee_hint()),
        }
    }
}

/// Stateful producer returned by [`Handle::iter`].
///
/// Each step re-reads the target, so elements appended during iteration are
/// visited and iteration stops as soon as the position passes the current
/// length. Channel iteration receives until the channel is closed and
/// drained.
#[derive(Debug)]
pub struct HandleIter {
    handle: Handle,
    position: usize,
}

impl Iterator for HandleIter {
    type Item = (HostValue, HostValue);

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.position;
        let item = match &self.handle.target {
            Target::Sequence(seq) => seq
                .get(pos)
                .map(|v| (HostValue::Int(pos as i64 + 1), self.handle.expose(v))),
            Target::Mapping(map) => map
                .get_index(pos)
                .map(|(k, v)| (HostValue::String(k), self.handle.expose(v))),
            Target::Struct(s) => s
                .field_at(pos)
                .map(|(k, v)| (HostValue::String(k), self.handle.expose(v))),
            Target::Channel(ch) => ch.receive().map(|v| (HostValue::Int(pos as i64 + 1), v)),
            Target::Pointer(_) => None,
        }?;
        self.position += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::StructType;
    use crate::kind::NumberKind;

    fn numbers() -> SequenceRef {
        SequenceRef::of(vec![10_i64, 20, 30])
    }

    #[test]
    fn test_from_host_mutability() {
        let seq = numbers();
        let value = Handle::from_host(&HostValue::Sequence(seq.clone())).unwrap();
        assert!(!value.is_mutable());

        let mutable = Handle::from_host(&HostValue::pointer(seq)).unwrap();
        assert!(mutable.is_mutable());
        assert_eq!(mutable.kind(), BridgeKind::Sequence);

        let ptr = Handle::from_host(&HostValue::pointer(7_i64)).unwrap();
        assert_eq!(ptr.kind(), BridgeKind::PointerLike);

        assert!(Handle::from_host(&HostValue::Int(1)).is_none());
    }

    #[test]
    fn test_sequence_index_bounds() {
        let handle = Handle::value(Target::Sequence(numbers()));
        assert!(matches!(
            handle.get(&Key::Index(0)),
            Err(BridgeError::OutOfRange { index: 0, len: 3 })
        ));
        assert!(matches!(
            handle.get(&Key::Index(4)),
            Err(BridgeError::OutOfRange { index: 4, len: 3 })
        ));
        match handle.get(&Key::Index(2)).unwrap() {
            Some(Member::Value(v)) => assert_eq!(v, HostValue::Int(20)),
            other => panic!("unexpected member: {other:?}"),
        }
    }

    #[test]
    fn test_value_handle_rejects_writes() {
        let seq = numbers();
        let handle = Handle::value(Target::Sequence(seq.clone()));
        assert!(matches!(
            handle.set(&Key::Index(1), HostValue::Int(1)),
            Err(BridgeError::ValueHandle { .. })
        ));

        let handle = Handle::mutable(Target::Sequence(seq.clone()));
        handle.set(&Key::Index(1), HostValue::Int(1)).unwrap();
        assert_eq!(seq.get(0), Some(HostValue::Int(1)));
    }

    #[test]
    fn test_mixed_equality_is_an_error() {
        let seq = numbers();
        let a = Handle::mutable(Target::Sequence(seq.clone()));
        let b = Handle::mutable(Target::Sequence(seq.clone()));
        let c = Handle::value(Target::Sequence(seq));
        assert!(a.identical(&b).unwrap());
        assert!(matches!(a.identical(&c), Err(BridgeError::MixedHandles { .. })));
        assert!(!a.identical(&Handle::mutable(Target::Sequence(numbers()))).unwrap());
    }

    #[test]
    fn test_iterators_are_independent() {
        let handle = Handle::value(Target::Sequence(numbers()));
        let mut first = handle.iter().unwrap();
        let mut second = handle.iter().unwrap();
        assert_eq!(first.next(), Some((HostValue::Int(1), HostValue::Int(10))));
        assert_eq!(first.next(), Some((HostValue::Int(2), HostValue::Int(20))));
        assert_eq!(second.next(), Some((HostValue::Int(1), HostValue::Int(10))));
        assert_eq!(first.count(), 1);
    }

    #[test]
    fn test_iteration_sees_length_at_call_time() {
        let seq = numbers();
        let handle = Handle::value(Target::Sequence(seq.clone()));
        let mut iter = handle.iter().unwrap();
        iter.next();
        seq.push(HostValue::Int(40));
        assert_eq!(iter.count(), 3);
    }

    #[test]
    fn test_struct_members() {
        let ty = StructType::builder("Counter")
            .field("N", NumberKind::I32)
            .method("Get", Vec::<TypeHint>::new(), |this, _| Ok(this.field("N").unwrap_or_default()))
            .pointer_method("Inc", Vec::<TypeHint>::new(), |this, _| {
                let n = this.field("N").and_then(|v| v.as_i64()).unwrap_or_default();
                this.set_field("N", HostValue::Int(n + 1))?;
                Ok(HostValue::Nil)
            })
            .build();
        let counter = crate::composite::StructRef::new(ty);

        let value = Handle::value(Target::Struct(counter.clone()));
        assert!(matches!(value.get(&Key::from("N")), Ok(Some(Member::Value(_)))));
        assert!(matches!(value.get(&Key::from("Get")), Ok(Some(Member::Method(_)))));
        assert!(value.get(&Key::from("Inc")).unwrap().is_none());
        assert!(value.get(&Key::from("Missing")).unwrap().is_none());

        let mutable = Handle::mutable(Target::Struct(counter.clone()));
        match mutable.get(&Key::from("Inc")).unwrap() {
            Some(Member::Method(m)) => {
                m.call(vec![]).unwrap();
            }
            other => panic!("unexpected member: {other:?}"),
        }
        assert_eq!(counter.field("N"), Some(HostValue::Int(1)));
        assert_eq!(
            mutable.element_hint(&Key::from("N")).unwrap(),
            TypeHint::Number(NumberKind::I32)
        );
    }

    #[test]
    fn test_channel_handle_operations() {
        let ch = ChannelRef::new(TypeHint::Bool, 4);
        let value = Handle::value(Target::Channel(ch.clone()));
        assert!(matches!(value.send(HostValue::Bool(true)), Err(BridgeError::ValueHandle { .. })));
        assert!(matches!(value.close(), Err(BridgeError::ValueHandle { .. })));

        let mutable = Handle::mutable(Target::Channel(ch));
        mutable.send(HostValue::Bool(true)).unwrap();
        assert_eq!(value.len().unwrap(), 1);
        mutable.close().unwrap();
        assert_eq!(value.receive().unwrap(), Some(HostValue::Bool(true)));
        assert_eq!(value.receive().unwrap(), None);
        assert!(matches!(
            value.get(&Key::from("receive")),
            Ok(Some(Member::Builtin(Builtin::Receive)))
        ));
    }

    #[test]
    fn test_mapping_nil_removes() {
        let map = MappingRef::new(TypeHint::String, [("a", HostValue::from("x"))]);
        let handle = Handle::mutable(Target::Mapping(map.clone()));
        handle.set(&Key::from("b"), HostValue::from("y")).unwrap();
        handle.set(&Key::from("a"), HostValue::Nil).unwrap();
        assert_eq!(map.keys(), vec!["b".to_string()]);
        assert_eq!(handle.len().unwrap(), 1);
    }

    #[test]
    fn test_mutable_elements_stay_mutable() {
        let inner = numbers();
        let outer = SequenceRef::new(TypeHint::Sequence, [HostValue::Sequence(inner.clone())]);
        let handle = Handle::mutable(Target::Sequence(outer));
        let Some(Member::Value(element)) = handle.get(&Key::Index(1)).unwrap() else {
            panic!("expected an element");
        };
        let element = Handle::from_host(&element).unwrap();
        assert!(element.is_mutable());
        element.set(&Key::Index(3), HostValue::Int(0)).unwrap();
        assert_eq!(inner.get(2), Some(HostValue::Int(0)));
    }
}
