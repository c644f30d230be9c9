//! Symbol lookup in the engine that holds compiled code.
//!
//! Instrumented code exports four debug-timer hooks. A call frame resolves
//! them by name to read performance counters; any of them may be missing.

use std::collections::HashMap;
use std::ffi::{CStr, c_char};

/// Address of a resolved symbol.
pub type SymbolAddress = usize;

pub const DEBUG_TIMER_COUNT: &str = "get_debug_timer_count";
pub const DEBUG_TIMER_NAME: &str = "get_debug_timer_name";
pub const DEBUG_TIMER_MICROSECONDS: &str = "get_debug_timer_microseconds";
pub const DEBUG_TIMER_CALL_COUNT: &str = "get_debug_timer_call_count";

pub type DebugTimerCountFn = unsafe extern "C" fn() -> usize;
pub type DebugTimerNameFn = unsafe extern "C" fn(usize) -> *const c_char;
pub type DebugTimerValueFn = unsafe extern "C" fn(usize) -> usize;

pub trait ExecutionEngine {
    fn find_symbol(&self, name: &str) -> Option<SymbolAddress>;
}

/// Engine over an explicit name to address table.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, SymbolAddress>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, address: SymbolAddress) -> &mut Self {
        self.symbols.insert(name.into(), address);
        self
    }

    /// Register the four debug-timer hooks.
    pub fn with_debug_timers(
        mut self,
        count: DebugTimerCountFn,
        name: DebugTimerNameFn,
        microseconds: DebugTimerValueFn,
        call_count: DebugTimerValueFn,
    ) -> Self {
        self.insert(DEBUG_TIMER_COUNT, count as SymbolAddress)
            .insert(DEBUG_TIMER_NAME, name as SymbolAddress)
            .insert(DEBUG_TIMER_MICROSECONDS, microseconds as SymbolAddress)
            .insert(DEBUG_TIMER_CALL_COUNT, call_count as SymbolAddress);
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl ExecutionEngine for SymbolTable {
    fn find_symbol(&self, name: &str) -> Option<SymbolAddress> {
        self.symbols.get(name).copied()
    }
}

/// One debug timer reported by compiled code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceCounter {
    pub name: String,
    pub microseconds: usize,
    pub call_count: usize,
}

struct DebugTimers {
    count: DebugTimerCountFn,
    name: DebugTimerNameFn,
    microseconds: DebugTimerValueFn,
    call_count: DebugTimerValueFn,
}

impl DebugTimers {
    /// All four hooks, or `None` if any is missing.
    fn resolve(engine: &dyn ExecutionEngine) -> Option<Self> {
        let count = engine.find_symbol(DEBUG_TIMER_COUNT)?;
        let name = engine.find_symbol(DEBUG_TIMER_NAME)?;
        let microseconds = engine.find_symbol(DEBUG_TIMER_MICROSECONDS)?;
        let call_count = engine.find_symbol(DEBUG_TIMER_CALL_COUNT)?;
        // SAFETY: engines only publish these names for functions with the hook signatures.
        unsafe {
            Some(Self {
                count: std::mem::transmute::<SymbolAddress, DebugTimerCountFn>(count),
                name: std::mem::transmute::<SymbolAddress, DebugTimerNameFn>(name),
                microseconds: std::mem::transmute::<SymbolAddress, DebugTimerValueFn>(microseconds),
                call_count: std::mem::transmute::<SymbolAddress, DebugTimerValueFn>(call_count),
            })
        }
    }
}

/// Read every debug timer exported by `engine`. Empty if a hook is missing.
pub fn read_debug_timers(engine: &dyn ExecutionEngine) -> Vec<PerformanceCounter> {
    let Some(timers) = DebugTimers::resolve(engine) else {
        return Vec::new();
    };
    // SAFETY: hooks were resolved above; names are NUL-terminated strings owned by the engine.
    unsafe {
        (0..(timers.count)())
            .map(|i| {
                let name = (timers.name)(i);
                let name = if name.is_null() { String::new() } else { CStr::from_ptr(name).to_string_lossy().into_owned() };
                PerformanceCounter { name, microseconds: (timers.microseconds)(i), call_count: (timers.call_count)(i) }
            })
            .collect()
    }
}
