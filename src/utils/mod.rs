pub mod case;
pub mod redact;
pub mod suggest;
pub mod text;
