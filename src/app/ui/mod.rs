mod controls;
mod panels;
mod query;
