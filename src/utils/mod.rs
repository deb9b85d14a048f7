mod models;

pub(crate) use self::models::alloc;
pub(crate) use self::models::cell;
pub(crate) use self::models::hint;
pub(crate) use self::models::sync;
