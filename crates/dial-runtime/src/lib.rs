mod expr;
mod rng;
mod session;
mod vars;

pub use expr::{evaluate, read_operand, split_segments, AssignOp, EvalContext, EvalError, Operator};
pub use session::{
    Session, SessionOptions, DEFAULT_TEXT_WIDTH, JUMP_LOOP_LIMIT, UNAVAILABLE_ACCENT_TEXT,
};
pub use vars::{is_global_name, shared_globals, ReservedName, SharedGlobals, VarStore, VarTable};
