mod routing;
mod scatter_gather;
pub(crate) mod utils;
