pub mod fit;
pub mod palette;
pub mod row;
pub mod terminal;
