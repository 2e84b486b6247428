mod dragger;

pub use dragger::*;
