use {
    crate::{
        Altrep,
        Condition,
        Fatal,
        FatalPolicy,
        HostConfig,
        Jump,
        PreserveKey,
        Scalar,
        Sexp,
        SexpType,
        StackSlot,
        object::{Attributes, Data, Flags, Object, default_cells},
        registry::{PreciousSet, ProtectStack},
        sexp::{HostId, Id},
    },
    std::{
        cell::{Cell, RefCell},
        collections::HashMap,
        marker::PhantomData,
        panic,
        process,
        ptr::NonNull,
        rc::Rc,
    },
    tracing::{error, trace, warn},
};

const RECLAIMED: &str = "use of reclaimed object";
const CORRUPT: &str = "object payload does not match its type";

/// Counters describing the work a host has done.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HostStats
{
    pub allocations: u64,
    pub collections: u64,
    pub reclaimed: u64,
    pub duplicates: u64,

    /// Number of bulk element reads through [`Host::get_region`].
    pub region_calls: u64,
}

/// Simulated garbage-collected runtime.
///
/// The host owns every object. Objects are reclaimed by [`gc`][`Self::gc`]
/// unless they are reachable from the protect stack, the precious set,
/// a global variable, or one of the host's singletons.
/// Errors inside the host are signaled by non-local transfer of control,
/// see [`error`][`Self::error`].
///
/// The `'h` parameter identifies the host at the type level,
/// so that references from one host cannot be used with another.
pub struct Host<'h>
{
    _host_id: HostId<'h>,
    config: HostConfig,
    pub (crate) state: RefCell<State>,

    /// Protect stack depth saved by each active landing context.
    pub (crate) contexts: RefCell<Vec<usize>>,

    /// Collection is inhibited while this is nonzero.
    gc_inhibit: Cell<u32>,

    stats: Cell<HostStats>,

    pub (crate) nil: Id,
    pub (crate) na_string: Id,
    pub (crate) blank_string: Id,
}

struct Slot
{
    generation: u32,
    object: Option<Object>,
}

pub (crate) struct State
{
    slots: Vec<Slot>,
    free: Vec<u32>,
    pub stack: ProtectStack,
    pub precious: PreciousSet,

    /// Intern table of char objects. Entries do not keep objects alive.
    pub chars: HashMap<Box<str>, Id>,

    pub globals: HashMap<Box<str>, Id>,
}

/// Failure detected while the state is borrowed.
///
/// It is raised only after the borrow ends,
/// because raising unwinds through the caller.
pub (crate) enum Raise
{
    Error(String),
    Fatal(String),
}

enum Access<V, T>
{
    Value(V),
    Class(Rc<dyn Altrep<T>>),
}

/* -------------------------------------------------------------------------- */
/*                           Creating and inspecting                          */
/* -------------------------------------------------------------------------- */

impl<'h> Host<'h>
{
    /// Create a host with the default configuration.
    ///
    /// The host is passed to the given function.
    /// When the function returns or panics, the host and all its objects
    /// are destroyed.
    pub fn with<F, R>(f: F) -> R
        where F: for<'i> FnOnce(&'i Host<'i>) -> R
    {
        Self::with_config(HostConfig::default(), f)
    }

    /// Create a host with the given configuration.
    pub fn with_config<F, R>(config: HostConfig, f: F) -> R
        // NOTE: Using Self here would allow the caller to choose 'h.
        //       That could result in multiple hosts with the same 'h.
        where F: for<'i> FnOnce(&'i Host<'i>) -> R
    {
        let mut state = State{
            slots: Vec::new(),
            free: Vec::new(),
            stack: ProtectStack::new(config.protect_stack_size),
            precious: PreciousSet::new(config.precious_limit),
            chars: HashMap::new(),
            globals: HashMap::new(),
        };

        let nil = state.insert(Object::new(SexpType::Nil, Data::Nil));
        let na_string = state.insert(Object::new(SexpType::Char, Data::Char(None)));
        let blank = Data::Char(Some("".into()));
        let blank_string = state.insert(Object::new(SexpType::Char, blank));
        state.chars.insert("".into(), blank_string);

        let host = Host{
            _host_id: PhantomData,
            config,
            state: RefCell::new(state),
            contexts: RefCell::new(Vec::new()),
            gc_inhibit: Cell::new(0),
            stats: Cell::new(HostStats::default()),
            nil,
            na_string,
            blank_string,
        };

        f(&host)
    }

    pub fn config(&self) -> &HostConfig
    {
        &self.config
    }

    pub fn stats(&self) -> HostStats
    {
        self.stats.get()
    }

    pub (crate) fn bump(&self, f: impl FnOnce(&mut HostStats))
    {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// The NULL object.
    pub fn nil(&self) -> Sexp<'h>
    {
        Sexp::new(self.nil)
    }

    /// The missing string.
    pub fn na_string(&self) -> Sexp<'h>
    {
        Sexp::new(self.na_string)
    }

    pub fn is_nil(&self, x: Sexp<'h>) -> bool
    {
        x.id == self.nil
    }

    /// Whether the object has not been reclaimed.
    pub fn is_live(&self, x: Sexp<'h>) -> bool
    {
        self.state.borrow().get(x.id).is_some()
    }

    /// Number of objects currently allocated, including singletons.
    pub fn live_objects(&self) -> usize
    {
        self.state.borrow().live()
    }

    pub fn type_of(&self, x: Sexp<'h>) -> SexpType
    {
        self.read(x, |object| Ok(object.r#type))
    }

    pub fn length(&self, x: Sexp<'h>) -> usize
    {
        self.read(x, |object| Ok(object.len()))
    }

    /// Whether the object is backed by an [`Altrep`] class.
    pub fn is_altrep(&self, x: Sexp<'h>) -> bool
    {
        self.read(x, |object| Ok(object.is_altrep()))
    }

    /// Number of live protection tokens referencing the object.
    pub fn protections(&self, x: Sexp<'h>) -> u32
    {
        self.read(x, |object| Ok(object.protections))
    }

    /// Whether modifying the object in place could be observed elsewhere.
    ///
    /// This is the case when the object is reachable from host code,
    /// or when more than one protection token references it.
    pub fn is_shared(&self, x: Sexp<'h>) -> bool
    {
        self.read(x, |object| {
            Ok(object.protections > 1 || object.flags.contains(Flags::NAMED))
        })
    }

    /// Record that host code holds on to the object.
    pub fn mark_named(&self, x: Sexp<'h>)
    {
        self.write(x, |object| { object.flags.insert(Flags::NAMED); Ok(()) });
    }

    /// Bind a global variable, making the object a root.
    pub fn define(&self, name: &str, x: Sexp<'h>)
    {
        self.mark_named(x);
        self.state.borrow_mut().globals.insert(name.into(), x.id);
    }

    /// Look up a global variable.
    pub fn lookup(&self, name: &str) -> Option<Sexp<'h>>
    {
        self.state.borrow().globals.get(name).copied().map(Sexp::new)
    }
}

/* -------------------------------------------------------------------------- */
/*                                 Allocating                                 */
/* -------------------------------------------------------------------------- */

impl<'h> Host<'h>
{
    /// Allocate a vector of the given type.
    ///
    /// Scalars are zeroed, character vectors are filled with the empty
    /// string, and lists are filled with NULL.
    pub fn alloc_vector(&self, r#type: SexpType, len: usize) -> Sexp<'h>
    {
        self.check_length(len);
        let data = match r#type {
            SexpType::Logical => Data::Logical(default_cells(len)),
            SexpType::Integer => Data::Integer(default_cells(len)),
            SexpType::Real    => Data::Real(default_cells(len)),
            SexpType::Raw     => Data::Raw(default_cells(len)),
            SexpType::String  => Data::String(vec![self.blank_string; len]),
            SexpType::List    => Data::List(vec![self.nil; len]),
            SexpType::Nil | SexpType::Char => self.error(&format!(
                "invalid type/length ({}/{}) in vector allocation", r#type, len,
            )),
        };
        Sexp::new(self.alloc(r#type, data, Attributes::new()))
    }

    /// Allocate a vector with the given elements.
    pub fn vector_from<T>(&self, values: &[T]) -> Sexp<'h>
        where T: Scalar
    {
        self.check_length(values.len());
        let cells = values.iter().copied().map(Cell::new).collect();
        Sexp::new(self.alloc(T::TYPE, T::direct_data(cells), Attributes::new()))
    }

    /// Allocate a vector of length one.
    pub fn scalar<T>(&self, value: T) -> Sexp<'h>
        where T: Scalar
    {
        self.vector_from(&[value])
    }

    /// Allocate a vector backed by the given class.
    pub fn new_altrep<T>(&self, class: Rc<dyn Altrep<T>>) -> Sexp<'h>
        where T: Scalar
    {
        Sexp::new(self.alloc(T::TYPE, T::abstract_data(class), Attributes::new()))
    }

    /// Intern a string as a char object.
    ///
    /// Strings containing nul bytes cannot be represented
    /// and cause an error to be signaled.
    pub fn mk_char(&self, string: &str) -> Sexp<'h>
    {
        if string.contains('\0') {
            self.error(&format!(
                "embedded nul in string: '{}'", string.escape_default(),
            ));
        }

        if let Some(id) = self.state.borrow().chars.get(string).copied() {
            return Sexp::new(id);
        }

        let data = Data::Char(Some(string.into()));
        let id = self.alloc(SexpType::Char, data, Attributes::new());
        self.state.borrow_mut().chars.insert(string.into(), id);
        Sexp::new(id)
    }

    /// Read the contents of a char object, or [`None`] for the missing string.
    pub fn char_string(&self, x: Sexp<'h>) -> Option<String>
    {
        self.read(x, |object| {
            expect_type(object, SexpType::Char, "CHAR")?;
            match &object.data {
                Data::Char(string) => Ok(string.as_deref().map(str::to_owned)),
                _ => Err(Raise::Fatal(CORRUPT.to_owned())),
            }
        })
    }

    /// Copy an object.
    ///
    /// The copy has its own attribute list and its own `names` vector.
    /// Other attribute values are shared. Abstract payloads are materialized.
    /// NULL and char objects are immutable and are returned as is.
    pub fn duplicate(&self, x: Sexp<'h>) -> Sexp<'h>
    {
        let r#type = self.type_of(x);
        if matches!(r#type, SexpType::Nil | SexpType::Char) {
            return x;
        }

        self.torture();
        let _inhibit = self.inhibit_gc();

        let (data, attributes) = self.read(x, |object| {
            let data = object.data.materialize().map_err(Raise::Error)?;
            Ok((data, object.attributes.clone()))
        });
        let attributes = self.copy_names(attributes, None);
        let id = self.alloc(r#type, data, attributes);

        self.bump(|stats| stats.duplicates += 1);
        trace!(?x, copy = ?Sexp::new(id), "duplicated object");
        Sexp::new(id)
    }

    /// Copy a vector into a vector of a different length.
    ///
    /// Common elements are copied, new elements are padded like in
    /// [`alloc_vector`][`Self::alloc_vector`]. Only the `names` attribute
    /// is carried over, resized and padded with empty strings.
    pub fn lengthgets(&self, x: Sexp<'h>, len: usize) -> Sexp<'h>
    {
        self.check_length(len);
        let r#type = self.type_of(x);

        self.torture();
        let _inhibit = self.inhibit_gc();

        let (data, attributes) = self.read(x, |object| {
            let data = object.data.materialize().map_err(Raise::Error)?;
            Ok((data, object.attributes.clone()))
        });
        let data = match data.resized(len, self.blank_string, self.nil) {
            Some(data) => data,
            None => self.error(&format!(
                "cannot set length of non-vector '{}'", r#type,
            )),
        };
        let attributes = self.copy_names(attributes, Some(len));
        Sexp::new(self.alloc(r#type, data, attributes))
    }

    fn copy_names(&self, attributes: Attributes, len: Option<usize>)
        -> Attributes
    {
        let mut copied = Attributes::new();
        for (name, id) in attributes {
            if &*name == "names" {
                let mut ids = self.read(Sexp::new(id), |object| {
                    match &object.data {
                        Data::String(ids) => Ok(ids.clone()),
                        _ => Err(Raise::Fatal(CORRUPT.to_owned())),
                    }
                });
                if let Some(len) = len {
                    ids.resize(len, self.blank_string);
                }
                let data = Data::String(ids);
                let names = self.alloc(SexpType::String, data, Attributes::new());
                copied.push((name, names));
            } else if len.is_none() {
                copied.push((name, id));
            }
        }
        copied
    }

    fn alloc(&self, r#type: SexpType, data: Data, attributes: Attributes) -> Id
    {
        self.torture();
        let mut object = Object::new(r#type, data);
        object.attributes = attributes;
        let id = self.state.borrow_mut().insert(object);
        self.bump(|stats| stats.allocations += 1);
        id
    }

    fn check_length(&self, len: usize)
    {
        if len > self.config.max_vector_length {
            self.error(&format!("cannot allocate vector of length {}", len));
        }
    }

    /// Collect before allocating when so configured.
    fn torture(&self)
    {
        if self.config.gc_torture && self.gc_inhibit.get() == 0 {
            self.gc();
        }
    }

    /// Suspend collection until the guard is dropped.
    ///
    /// Compound operations that allocate several objects use this,
    /// because their intermediate objects are not yet reachable.
    fn inhibit_gc(&self) -> InhibitGc
    {
        self.gc_inhibit.set(self.gc_inhibit.get() + 1);
        InhibitGc{counter: &self.gc_inhibit}
    }
}

struct InhibitGc<'a>
{
    counter: &'a Cell<u32>,
}

impl<'a> Drop for InhibitGc<'a>
{
    fn drop(&mut self)
    {
        self.counter.set(self.counter.get() - 1);
    }
}

/* -------------------------------------------------------------------------- */
/*                              Accessing elements                            */
/* -------------------------------------------------------------------------- */

impl<'h> Host<'h>
{
    /// Pointer to the contiguous elements of a vector.
    ///
    /// Returns [`None`] for abstract-backed vectors.
    /// The pointer is valid for [`length`][`Self::length`] elements
    /// for as long as the object is live.
    pub fn dataptr<T>(&self, x: Sexp<'h>) -> Option<NonNull<Cell<T>>>
        where T: Scalar
    {
        self.read(x, |object| {
            expect_type(object, T::TYPE, "DATAPTR")?;
            Ok(T::direct(&object.data).map(|cells| NonNull::from(cells).cast()))
        })
    }

    /// Read a single element.
    pub fn elt<T>(&self, x: Sexp<'h>, index: usize) -> T
        where T: Scalar
    {
        let access = self.read(x, |object| {
            expect_type(object, T::TYPE, "ELT")?;
            expect_index(object, index)?;
            scalar_access::<T, _, _>(object, |cells| cells[index].get())
        });
        match access {
            Access::Value(value) => value,
            Access::Class(class) => class.elt(index),
        }
    }

    /// Write a single element.
    ///
    /// Writing to an abstract-backed vector materializes it first.
    pub fn set_elt<T>(&self, x: Sexp<'h>, index: usize, value: T)
        where T: Scalar
    {
        if self.is_altrep(x) {
            self.materialize(x);
        }
        self.read(x, |object| {
            expect_type(object, T::TYPE, "SET_ELT")?;
            expect_index(object, index)?;
            match T::direct(&object.data) {
                Some(cells) => Ok(cells[index].set(value)),
                None => Err(Raise::Fatal(CORRUPT.to_owned())),
            }
        });
    }

    /// Copy consecutive elements into `buf`.
    ///
    /// Returns the number of elements copied, which is the smaller of
    /// the buffer length and the number of elements from `start`.
    /// Abstract-backed classes may fail, which signals an error.
    pub fn get_region<T>(&self, x: Sexp<'h>, start: usize, buf: &mut [T])
        -> usize
        where T: Scalar
    {
        self.bump(|stats| stats.region_calls += 1);
        let access = self.read(x, |object| {
            expect_type(object, T::TYPE, "GET_REGION")?;
            let len = object.len();
            if start > len {
                return Err(Raise::Fatal(format!(
                    "region start {} out of bounds for length {}", start, len,
                )));
            }
            let count = buf.len().min(len - start);
            scalar_access::<T, _, _>(object, |cells| {
                for (slot, cell) in buf.iter_mut().zip(&cells[start ..][.. count]) {
                    *slot = cell.get();
                }
                count
            })
        });
        match access {
            Access::Value(count) => count,
            Access::Class(class) =>
                match class.get_region(start, buf) {
                    Ok(count) => count,
                    Err(message) => self.error(&message),
                },
        }
    }

    fn materialize(&self, x: Sexp<'h>)
    {
        let data = self.read(x, |object| {
            object.data.materialize().map_err(Raise::Error)
        });
        self.write(x, |object| { object.data = data; Ok(()) });
    }

    pub fn string_elt(&self, x: Sexp<'h>, index: usize) -> Sexp<'h>
    {
        self.read(x, |object| {
            expect_type(object, SexpType::String, "STRING_ELT")?;
            expect_index(object, index)?;
            match &object.data {
                Data::String(ids) => Ok(Sexp::new(ids[index])),
                _ => Err(Raise::Fatal(CORRUPT.to_owned())),
            }
        })
    }

    /// Write an element of a character vector.
    ///
    /// The value must be a char object.
    pub fn set_string_elt(&self, x: Sexp<'h>, index: usize, value: Sexp<'h>)
    {
        let value_type = self.type_of(value);
        if value_type != SexpType::Char {
            self.error(&format!(
                "Value of SET_STRING_ELT() must be a 'CHARSXP' not a '{}'",
                value_type,
            ));
        }
        self.write(x, |object| {
            expect_type(object, SexpType::String, "SET_STRING_ELT")?;
            expect_index(object, index)?;
            match &mut object.data {
                Data::String(ids) => { ids[index] = value.id; Ok(()) },
                _ => Err(Raise::Fatal(CORRUPT.to_owned())),
            }
        });
    }

    pub fn vector_elt(&self, x: Sexp<'h>, index: usize) -> Sexp<'h>
    {
        self.read(x, |object| {
            expect_type(object, SexpType::List, "VECTOR_ELT")?;
            expect_index(object, index)?;
            match &object.data {
                Data::List(ids) => Ok(Sexp::new(ids[index])),
                _ => Err(Raise::Fatal(CORRUPT.to_owned())),
            }
        })
    }

    pub fn set_vector_elt(&self, x: Sexp<'h>, index: usize, value: Sexp<'h>)
    {
        // Reading the type checks that the value is live.
        self.type_of(value);
        self.write(x, |object| {
            expect_type(object, SexpType::List, "SET_VECTOR_ELT")?;
            expect_index(object, index)?;
            match &mut object.data {
                Data::List(ids) => { ids[index] = value.id; Ok(()) },
                _ => Err(Raise::Fatal(CORRUPT.to_owned())),
            }
        });
    }

    /// Look up an attribute, returning NULL when it is absent.
    pub fn attrib(&self, x: Sexp<'h>, name: &str) -> Sexp<'h>
    {
        let id = self.read(x, |object| Ok(object.attribute(name)));
        Sexp::new(id.unwrap_or(self.nil))
    }

    /// Set an attribute; setting it to NULL removes it.
    ///
    /// The `names` attribute must be a character vector
    /// of the same length as the object.
    pub fn set_attrib(&self, x: Sexp<'h>, name: &str, value: Sexp<'h>)
    {
        if self.is_nil(x) {
            self.error("attempt to set an attribute on NULL");
        }

        if self.is_nil(value) {
            self.write(x, |object| {
                object.attributes.retain(|(key, _)| &**key != name);
                Ok(())
            });
            return;
        }

        let value_type = self.type_of(value);
        if name == "names" {
            if value_type != SexpType::String {
                self.error(&format!(
                    "'names' attribute must be a character vector, not '{}'",
                    value_type,
                ));
            }
            let (names_len, len) = (self.length(value), self.length(x));
            if names_len != len {
                self.error(&format!(
                    "'names' attribute [{}] must be the same length \
                     as the vector [{}]", names_len, len,
                ));
            }
        }

        self.write(x, |object| {
            match object.attributes.iter_mut().find(|(key, _)| &**key == name) {
                Some(entry) => entry.1 = value.id,
                None => object.attributes.push((name.into(), value.id)),
            }
            Ok(())
        });
    }
}

fn expect_type(object: &Object, expected: SexpType, what: &str)
    -> Result<(), Raise>
{
    if object.r#type == expected {
        return Ok(());
    }
    Err(Raise::Error(format!(
        "{}() can only be applied to a '{}', not a '{}'",
        what, expected, object.r#type,
    )))
}

fn expect_index(object: &Object, index: usize) -> Result<(), Raise>
{
    let len = object.len();
    if index < len {
        return Ok(());
    }
    Err(Raise::Fatal(format!(
        "index {} out of bounds for object of length {}", index, len,
    )))
}

/// Dispatch on the storage of a scalar vector.
fn scalar_access<T, V, F>(object: &Object, f: F) -> Result<Access<V, T>, Raise>
    where T: Scalar
        , F: FnOnce(&[Cell<T>]) -> V
{
    if let Some(cells) = T::direct(&object.data) {
        return Ok(Access::Value(f(cells)));
    }
    match T::abstract_class(&object.data) {
        Some(class) => Ok(Access::Class(class.clone())),
        None => Err(Raise::Fatal(CORRUPT.to_owned())),
    }
}

/* -------------------------------------------------------------------------- */
/*                                 Protecting                                 */
/* -------------------------------------------------------------------------- */

impl<'h> Host<'h>
{
    /// Push an object onto the protect stack.
    ///
    /// Overflowing the stack is fatal.
    pub fn protect(&self, x: Sexp<'h>) -> StackSlot
    {
        let result = self.state.borrow_mut().protect(x.id);
        result.unwrap_or_else(|raise| self.raise(raise))
    }

    /// Pop an entry from the protect stack.
    ///
    /// The entry must be the topmost one; anything else is fatal.
    pub fn unprotect(&self, slot: StackSlot)
    {
        let result = self.state.borrow_mut().unprotect(slot);
        result.unwrap_or_else(|raise| self.raise(raise))
    }

    /// Replace the object of a protect stack entry in place.
    pub fn reprotect(&self, slot: &StackSlot, x: Sexp<'h>)
    {
        let result = self.state.borrow_mut().reprotect(slot, x.id);
        result.unwrap_or_else(|raise| self.raise(raise))
    }

    /// Insert an object into the precious set.
    ///
    /// Exhausting the precious set is fatal.
    pub fn preserve(&self, x: Sexp<'h>) -> PreserveKey
    {
        let result = self.state.borrow_mut().preserve(x.id);
        result.unwrap_or_else(|raise| self.raise(raise))
    }

    /// Remove an entry from the precious set.
    pub fn release(&self, key: PreserveKey)
    {
        let result = self.state.borrow_mut().release(key);
        result.unwrap_or_else(|raise| self.raise(raise))
    }

    pub fn protect_depth(&self) -> usize
    {
        self.state.borrow().stack.depth()
    }

    /// Number of entries that can still be pushed onto the protect stack.
    pub fn protect_headroom(&self) -> usize
    {
        self.state.borrow().stack.headroom()
    }

    pub fn precious_len(&self) -> usize
    {
        self.state.borrow().precious.len()
    }

    /// Number of entries that can still be inserted into the precious set.
    pub fn precious_headroom(&self) -> usize
    {
        self.state.borrow().precious.headroom()
    }

    /// Pop every protect stack entry at or above `depth`.
    pub (crate) fn truncate_stack(&self, depth: usize)
    {
        let leaked = {
            let mut state = self.state.borrow_mut();
            let leaked = state.stack.truncate(depth);
            for id in &leaked {
                state.unretain(*id);
            }
            leaked.len()
        };
        if leaked != 0 {
            warn!(leaked, depth, "released leaked protect stack entries");
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                               Raising errors                               */
/* -------------------------------------------------------------------------- */

impl<'h> Host<'h>
{
    /// Signal an error.
    ///
    /// Control does not return. The host transfers control
    /// to the innermost landing context, unwinding with a [`Jump`] payload.
    /// Signaling an error while no context is active is fatal.
    pub fn error(&self, message: &str) -> !
    {
        if self.contexts.borrow().is_empty() {
            self.fatal(&format!("error outside of any context: {}", message));
        }
        trace!(message, "signaling condition");
        let jump = Jump::new(Condition::new(message));
        panic::resume_unwind(Box::new(jump))
    }

    /// Give up on the process.
    pub fn fatal(&self, message: &str) -> !
    {
        error!(message, "fatal host condition");
        match self.config.fatal {
            FatalPolicy::Abort  => process::abort(),
            FatalPolicy::Unwind => {
                let fatal = Fatal::new(message.to_owned());
                panic::resume_unwind(Box::new(fatal))
            },
        }
    }

    pub (crate) fn raise(&self, raise: Raise) -> !
    {
        match raise {
            Raise::Error(message) => self.error(&message),
            Raise::Fatal(message) => self.fatal(&message),
        }
    }

    fn read<R>(&self, x: Sexp<'h>, f: impl FnOnce(&Object) -> Result<R, Raise>)
        -> R
    {
        let result = match self.state.borrow().get(x.id) {
            Some(object) => f(object),
            None => Err(Raise::Fatal(RECLAIMED.to_owned())),
        };
        result.unwrap_or_else(|raise| self.raise(raise))
    }

    fn write<R>(&self, x: Sexp<'h>, f: impl FnOnce(&mut Object) -> Result<R, Raise>)
        -> R
    {
        let result = match self.state.borrow_mut().get_mut(x.id) {
            Some(object) => f(object),
            None => Err(Raise::Fatal(RECLAIMED.to_owned())),
        };
        result.unwrap_or_else(|raise| self.raise(raise))
    }
}

/* -------------------------------------------------------------------------- */
/*                                 Heap state                                 */
/* -------------------------------------------------------------------------- */

impl State
{
    pub fn get(&self, id: Id) -> Option<&Object>
    {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut Object>
    {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.object.as_mut()
    }

    pub fn insert(&mut self, object: Object) -> Id
    {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                Id{index, generation: slot.generation}
            },
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot{generation: 0, object: Some(object)});
                Id{index, generation: 0}
            },
        }
    }

    pub fn live(&self) -> usize
    {
        self.slots.len() - self.free.len()
    }

    /// Reclaim every slot whose object is not marked,
    /// and clear the marks of the others.
    pub fn sweep(&mut self) -> usize
    {
        let mut reclaimed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let marked = match &mut slot.object {
                Some(object) => {
                    let marked = object.flags.contains(Flags::MARK);
                    object.flags.remove(Flags::MARK);
                    marked
                },
                None => continue,
            };
            if !marked {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                reclaimed += 1;
            }
        }

        let slots = &self.slots;
        self.chars.retain(|_, id| {
            let slot = &slots[id.index as usize];
            slot.generation == id.generation && slot.object.is_some()
        });

        reclaimed
    }

    fn protect(&mut self, id: Id) -> Result<StackSlot, Raise>
    {
        self.get(id).ok_or_else(|| Raise::Fatal(RECLAIMED.to_owned()))?;
        let slot = self.stack.push(id).ok_or_else(|| {
            Raise::Fatal("protect(): protection stack overflow".to_owned())
        })?;
        self.retain(id);
        Ok(slot)
    }

    fn unprotect(&mut self, slot: StackSlot) -> Result<(), Raise>
    {
        let id = self.stack.pop(slot).ok_or_else(|| {
            Raise::Fatal("unprotect: stack imbalance".to_owned())
        })?;
        self.unretain(id);
        Ok(())
    }

    fn reprotect(&mut self, slot: &StackSlot, id: Id) -> Result<(), Raise>
    {
        self.get(id).ok_or_else(|| Raise::Fatal(RECLAIMED.to_owned()))?;
        let old = self.stack.replace(slot, id).ok_or_else(|| {
            Raise::Fatal("reprotect(): invalid stack slot".to_owned())
        })?;
        self.retain(id);
        self.unretain(old);
        Ok(())
    }

    fn preserve(&mut self, id: Id) -> Result<PreserveKey, Raise>
    {
        self.get(id).ok_or_else(|| Raise::Fatal(RECLAIMED.to_owned()))?;
        let key = self.precious.insert(id).ok_or_else(|| {
            Raise::Fatal("preserve(): precious set exhausted".to_owned())
        })?;
        self.retain(id);
        Ok(key)
    }

    fn release(&mut self, key: PreserveKey) -> Result<(), Raise>
    {
        let id = self.precious.remove(key).ok_or_else(|| {
            Raise::Fatal("release(): object was not preserved".to_owned())
        })?;
        self.unretain(id);
        Ok(())
    }

    fn retain(&mut self, id: Id)
    {
        if let Some(object) = self.get_mut(id) {
            object.protections += 1;
        }
    }

    fn unretain(&mut self, id: Id)
    {
        if let Some(object) = self.get_mut(id) {
            object.protections = object.protections.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::{CompactIntSeq, Logical},
        proptest::proptest,
        std::panic::AssertUnwindSafe,
    };

    fn unwinding() -> HostConfig
    {
        HostConfig{fatal: FatalPolicy::Unwind, ..HostConfig::default()}
    }

    fn torture() -> HostConfig
    {
        HostConfig{gc_torture: true, ..unwinding()}
    }

    fn fatal_message(f: impl FnOnce()) -> String
    {
        let payload = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_err();
        payload.downcast::<Fatal>().unwrap().message().to_owned()
    }

    #[test]
    fn alloc_vector_defaults()
    {
        Host::with_config(unwinding(), |host| {
            let x = host.alloc_vector(SexpType::Integer, 3);
            assert_eq!(host.length(x), 3);
            assert_eq!(host.elt::<i32>(x, 2), 0);

            let s = host.alloc_vector(SexpType::String, 2);
            let blank = host.string_elt(s, 1);
            assert_eq!(host.char_string(blank).as_deref(), Some(""));

            let l = host.alloc_vector(SexpType::List, 1);
            assert!(host.is_nil(host.vector_elt(l, 0)));
        });
    }

    #[test]
    fn mk_char_interns()
    {
        Host::with_config(unwinding(), |host| {
            let a = host.mk_char("hello");
            let b = host.mk_char("hello");
            assert_eq!(a, b);
            assert_eq!(host.length(a), 5);
            assert_eq!(host.char_string(host.na_string()), None);
        });
    }

    #[test]
    fn mk_char_rejects_nul()
    {
        Host::with_config(unwinding(), |host| {
            let result = host.toplevel(|| host.mk_char("a\0b"));
            assert_eq!(
                result.unwrap_err().message(),
                "embedded nul in string: 'a\\u{0}b'",
            );
        });
    }

    #[test]
    fn error_outside_context_is_fatal()
    {
        Host::with_config(unwinding(), |host| {
            let message = fatal_message(|| host.error("boom"));
            assert_eq!(message, "error outside of any context: boom");
        });
    }

    #[test]
    fn gc_reclaims_unprotected()
    {
        Host::with_config(unwinding(), |host| {
            let kept = host.alloc_vector(SexpType::Real, 4);
            let lost = host.alloc_vector(SexpType::Real, 4);
            let slot = host.protect(kept);
            assert_eq!(host.gc(), 1);
            assert!(host.is_live(kept));
            assert!(!host.is_live(lost));
            assert_eq!(fatal_message(|| { host.length(lost); }), RECLAIMED);
            host.unprotect(slot);
        });
    }

    #[test]
    fn gc_traces_children()
    {
        Host::with_config(unwinding(), |host| {
            let list = host.alloc_vector(SexpType::List, 1);
            let key = host.preserve(list);
            let element = host.scalar(7i32);
            host.set_vector_elt(list, 0, element);
            let names = host.alloc_vector(SexpType::String, 1);
            host.set_string_elt(names, 0, host.mk_char("x"));
            host.set_attrib(list, "names", names);

            host.gc();
            assert_eq!(host.elt::<i32>(element, 0), 7);
            let name = host.string_elt(host.attrib(list, "names"), 0);
            assert_eq!(host.char_string(name).as_deref(), Some("x"));
            host.release(key);

            host.gc();
            assert!(!host.is_live(element));
        });
    }

    #[test]
    fn torture_reclaims_at_next_allocation()
    {
        Host::with_config(torture(), |host| {
            let x = host.scalar(1.5f64);
            let slot = host.protect(x);
            let y = host.scalar(2.5f64);
            host.scalar(0u8);
            assert!(host.is_live(x));
            assert!(!host.is_live(y));
            host.unprotect(slot);
        });
    }

    #[test]
    fn out_of_order_unprotect_is_fatal()
    {
        Host::with_config(unwinding(), |host| {
            let a = host.protect(host.nil());
            let _b = host.protect(host.nil());
            let message = fatal_message(|| host.unprotect(a));
            assert_eq!(message, "unprotect: stack imbalance");
        });
    }

    #[test]
    fn stack_overflow_is_fatal()
    {
        let config = HostConfig{protect_stack_size: 2, ..unwinding()};
        Host::with_config(config, |host| {
            let _a = host.protect(host.nil());
            let _b = host.protect(host.nil());
            assert_eq!(host.protect_headroom(), 0);
            let message = fatal_message(|| { let _c = host.protect(host.nil()); });
            assert_eq!(message, "protect(): protection stack overflow");
        });
    }

    #[test]
    fn toplevel_lands_leaked_entries()
    {
        Host::with_config(unwinding(), |host| {
            let outer = host.protect(host.nil());
            let result = host.toplevel(|| {
                let _leaked = host.protect(host.scalar(1i32));
                let _leaked = host.protect(host.scalar(2i32));
                host.error("failed");
            });
            assert_eq!(result.unwrap_err().message(), "failed");
            assert_eq!(host.protect_depth(), 1);
            assert_eq!(host.context_depth(), 0);
            host.unprotect(outer);
        });
    }

    #[test]
    fn protection_counts_sharing()
    {
        Host::with_config(unwinding(), |host| {
            let x = host.scalar(Logical::TRUE);
            let a = host.preserve(x);
            assert!(!host.is_shared(x));
            let b = host.protect(x);
            assert!(host.is_shared(x));
            host.unprotect(b);
            assert_eq!(host.protections(x), 1);
            host.release(a);

            host.define("x", x);
            assert!(host.is_shared(x));
            assert_eq!(host.lookup("x"), Some(x));
        });
    }

    #[test]
    fn names_length_is_checked()
    {
        Host::with_config(unwinding(), |host| {
            let x = host.alloc_vector(SexpType::Integer, 3);
            let names = host.alloc_vector(SexpType::String, 2);
            let result = host.toplevel(|| host.set_attrib(x, "names", names));
            assert_eq!(
                result.unwrap_err().message(),
                "'names' attribute [2] must be the same length as the vector [3]",
            );
        });
    }

    #[test]
    fn lengthgets_pads_names()
    {
        Host::with_config(torture(), |host| {
            let x = host.vector_from(&[1i32, 2, 3]);
            let xs = host.protect(x);
            let names = host.alloc_vector(SexpType::String, 3);
            host.set_attrib(x, "names", names);
            host.set_string_elt(names, 0, host.mk_char("a"));

            let y = host.lengthgets(x, 5);
            let ys = host.protect(y);
            assert_eq!(host.length(y), 5);
            assert_eq!(host.elt::<i32>(y, 2), 3);
            assert_eq!(host.elt::<i32>(y, 4), 0);
            let names = host.attrib(y, "names");
            assert_eq!(host.length(names), 5);
            let first = host.string_elt(names, 0);
            assert_eq!(host.char_string(first).as_deref(), Some("a"));

            host.unprotect(ys);
            host.unprotect(xs);
        });
    }

    #[test]
    fn duplicate_is_independent()
    {
        Host::with_config(unwinding(), |host| {
            let x = host.vector_from(&[1u8, 2, 3]);
            let y = host.duplicate(x);
            host.set_elt(y, 0, 9u8);
            assert_eq!(host.elt::<u8>(x, 0), 1);
            assert_eq!(host.elt::<u8>(y, 0), 9);
            assert_eq!(host.stats().duplicates, 1);
        });
    }

    #[test]
    fn writing_altrep_materializes()
    {
        Host::with_config(unwinding(), |host| {
            let x = host.new_altrep::<i32>(Rc::new(CompactIntSeq::ascending(1, 4)));
            assert!(host.is_altrep(x));
            assert!(host.dataptr::<i32>(x).is_none());
            host.set_elt(x, 1, 20i32);
            assert!(!host.is_altrep(x));
            assert!(host.dataptr::<i32>(x).is_some());
            let values: Vec<i32> = (0 .. 4).map(|i| host.elt(x, i)).collect();
            assert_eq!(values, [1, 20, 3, 4]);
        });
    }

    #[test]
    fn type_mismatch_is_an_error()
    {
        Host::with_config(unwinding(), |host| {
            let x = host.scalar(1i32);
            let result = host.toplevel(|| host.elt::<f64>(x, 0));
            assert_eq!(
                result.unwrap_err().message(),
                "ELT() can only be applied to a 'double', not a 'integer'",
            );
        });
    }

    proptest!
    {
        #[test]
        fn get_region_matches_elt(
            values in proptest::collection::vec(proptest::num::f64::NORMAL, 0 .. 200),
            start in 0usize .. 200,
            size in 0usize .. 80,
        )
        {
            Host::with_config(unwinding(), |host| {
                let x = host.vector_from(&values);
                let start = start.min(values.len());
                let mut buf = vec![0.0; size];
                let count = host.get_region(x, start, &mut buf);
                assert_eq!(count, size.min(values.len() - start));
                assert_eq!(&buf[.. count], &values[start ..][.. count]);
                assert_eq!(host.stats().region_calls, 1);
            });
        }
    }
}
