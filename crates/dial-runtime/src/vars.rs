use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use dial_core::Value;

pub type VarTable = BTreeMap<String, Value>;

pub type SharedGlobals = Rc<RefCell<VarTable>>;

pub fn shared_globals() -> SharedGlobals {
    Rc::new(RefCell::new(VarTable::new()))
}

pub fn is_global_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedName {
    Repeat,
    Once,
    True,
    False,
    Random,
}

impl ReservedName {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "REPEAT" => Some(Self::Repeat),
            "ONCE" => Some(Self::Once),
            "TRUE" => Some(Self::True),
            "FALSE" => Some(Self::False),
            "RANDOM" => Some(Self::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarStore {
    locals: VarTable,
    globals: SharedGlobals,
}

impl VarStore {
    pub fn new(globals: SharedGlobals) -> Self {
        Self {
            locals: VarTable::new(),
            globals,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if is_global_name(name) {
            self.globals.borrow().get(name).cloned()
        } else {
            self.locals.get(name).cloned()
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        if is_global_name(name) {
            self.globals.borrow_mut().insert(name.to_string(), value);
        } else {
            self.locals.insert(name.to_string(), value);
        }
    }

    pub fn clear_locals(&mut self) {
        self.locals.clear();
    }

    pub fn locals(&self) -> &VarTable {
        &self.locals
    }

    pub fn globals(&self) -> &SharedGlobals {
        &self.globals
    }

    pub fn globals_snapshot(&self) -> VarTable {
        self.globals.borrow().clone()
    }
}
