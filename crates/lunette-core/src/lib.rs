pub mod table;
pub mod value;

pub use table::{NilKeyError, Table};
pub use value::{new_cell, Closure, LuaValue, NativeError, NativeFunction, TableRef, UpvalCell};
