pub mod model;
pub mod slug;
