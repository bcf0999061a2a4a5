//! Lua userdata over host composite handles.
//!
//! Every capability is implemented by [`Handle`]; this module only maps Lua
//! metamethods onto it and converts keys, arguments and results.
//! Built-ins and struct methods are meant to be called with method syntax
//! (`ch:send(v)`, `p:Scale(2)`); the receiver argument is skipped.

use mlua::{AnyUserData, Function, Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value};
use scriptbridge_core::{
    BoundMethod, BridgeError, BridgeKind, Builtin, Handle, HostValue, Key, Member,
};

use super::convert::{bad_argument, convert_args, to_host, to_script};

/// Userdata wrapper around a [`Handle`].
#[derive(Debug, Clone)]
pub struct LuaProxy(pub Handle);

impl UserData for LuaProxy {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: Value| {
            let key = to_key(&this.0, &key)?;
            match this.0.get(&key).map_err(mlua::Error::external)? {
                None => Ok(Value::Nil),
                Some(Member::Value(v)) => to_script(lua, v),
                Some(Member::Method(m)) => bound_method(lua, m).map(Value::Function),
                Some(Member::Builtin(b)) => builtin(lua, this.0.clone(), b).map(Value::Function),
            }
        });

        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, value): (Value, Value)| {
                let handle = &this.0;
                handle
                    .ensure_mutable("index assignment")
                    .map_err(mlua::Error::external)?;
                let key = to_key(handle, &key)?;
                let host = if value.is_nil() && handle.kind() == BridgeKind::Mapping {
                    HostValue::Nil
                } else {
                    let hint = handle.element_hint(&key).map_err(mlua::Error::external)?;
                    to_host(value, hint).map_err(|e| bad_argument(3, e))?
                };
                handle.set(&key, host).map_err(mlua::Error::external)
            },
        );

        methods.add_meta_method(MetaMethod::Len, |_, this, ()| {
            this.0.len().map_err(mlua::Error::external)
        });

        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            match other.borrow::<LuaProxy>() {
                Ok(other) => this.0.identical(&other.0).map_err(mlua::Error::external),
                Err(_) => Ok(false),
            }
        });

        methods.add_meta_method(MetaMethod::Call, |lua, this, args: MultiValue| {
            if this.0.kind() == BridgeKind::PointerLike {
                return pointer_call(lua, &this.0, args);
            }
            iterator(lua, &this.0).map(|f| MultiValue::from_vec(vec![Value::Function(f)]))
        });

        methods.add_meta_method(MetaMethod::Pairs, |lua, this, ()| {
            let next = iterator(lua, &this.0)?;
            Ok((next, Value::Nil, Value::Nil))
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
    }
}

/// Convert a Lua key. Integral floats are accepted as indices.
fn to_key(handle: &Handle, key: &Value) -> mlua::Result<Key> {
    match key {
        Value::Integer(i) => Ok(Key::Index(*i)),
        Value::Number(n) if n.fract() == 0.0 => Ok(Key::Index(*n as i64)),
        Value::String(s) => Ok(Key::Name(s.to_string_lossy())),
        other => Err(mlua::Error::external(BridgeError::InvalidKey {
            kind: handle.kind(),
            key: other.type_name().to_string(),
        })),
    }
}

/// `p()` reads the pointee, `p(v)` stores `v`.
fn pointer_call(lua: &Lua, handle: &Handle, args: MultiValue) -> mlua::Result<MultiValue> {
    match args.into_iter().next() {
        None => {
            let value = handle.load().map_err(mlua::Error::external)?;
            Ok(MultiValue::from_vec(vec![to_script(lua, value)?]))
        }
        Some(value) => {
            handle.ensure_mutable("store").map_err(mlua::Error::external)?;
            let hint = handle
                .element_hint(&Key::Index(1))
                .map_err(mlua::Error::external)?;
            let value = to_host(value, hint).map_err(|e| bad_argument(2, e))?;
            handle.store(value).map_err(mlua::Error::external)?;
            Ok(MultiValue::new())
        }
    }
}

/// A fresh iterator function yielding `(key, value)` pairs.
fn iterator(lua: &Lua, handle: &Handle) -> mlua::Result<Function> {
    let mut iter = handle.iter().map_err(mlua::Error::external)?;
    lua.create_function_mut(move |lua, _: MultiValue| match iter.next() {
        Some((key, value)) => Ok(MultiValue::from_vec(vec![
            to_script(lua, key)?,
            to_script(lua, value)?,
        ])),
        None => Ok(MultiValue::new()),
    })
}

fn bound_method(lua: &Lua, method: BoundMethod) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let args = convert_args(args.into_iter().skip(1), method.params(), 2)?;
        let result = method.call(args).map_err(mlua::Error::external)?;
        to_script(lua, result)
    })
}

fn builtin(lua: &Lua, handle: Handle, op: Builtin) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let mut args = args.into_iter().skip(1);
        let external = mlua::Error::external;
        match op {
            Builtin::Append => {
                let hint = handle.element_hint(&Key::Index(1)).map_err(external)?;
                let values = args
                    .enumerate()
                    .map(|(i, v)| to_host(v, hint).map_err(|e| bad_argument(i + 2, e)))
                    .collect::<mlua::Result<Vec<_>>>()?;
                let grown = handle.append(values).map_err(external)?;
                let proxy = lua.create_userdata(LuaProxy(grown))?;
                Ok(MultiValue::from_vec(vec![Value::UserData(proxy)]))
            }
            Builtin::Capacity => {
                let capacity = handle.capacity().map_err(external)?;
                Ok(MultiValue::from_vec(vec![Value::Integer(capacity as i64)]))
            }
            Builtin::Send => {
                handle.ensure_mutable(op.name()).map_err(external)?;
                let hint = handle.element_hint(&Key::Index(1)).map_err(external)?;
                let value = to_host(args.next().unwrap_or(Value::Nil), hint)
                    .map_err(|e| bad_argument(2, e))?;
                handle.send(value).map_err(external)?;
                Ok(MultiValue::new())
            }
            Builtin::Receive => match handle.receive().map_err(external)? {
                Some(value) => Ok(MultiValue::from_vec(vec![
                    to_script(lua, value)?,
                    Value::Boolean(true),
                ])),
                None => Ok(MultiValue::from_vec(vec![Value::Nil, Value::Boolean(false)])),
            },
            Builtin::Close => {
                handle.close().map_err(external)?;
                Ok(MultiValue::new())
            }
        }
    })
}
