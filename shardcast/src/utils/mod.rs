pub(crate) mod pretty;
