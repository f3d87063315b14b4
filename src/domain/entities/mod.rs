pub mod history;
pub mod row;
pub mod row_set;
pub mod sheet;
pub mod table;
