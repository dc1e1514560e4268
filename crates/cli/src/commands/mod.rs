pub(crate) mod synth;
pub(crate) mod validate;
