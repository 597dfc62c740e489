pub(crate) mod ease;
pub(crate) mod mapping;
pub(crate) mod procedural;
pub(crate) mod spring;
