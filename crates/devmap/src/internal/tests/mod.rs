mod test_identity;

pub(crate) mod utils;
