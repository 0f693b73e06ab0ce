//! Order aggregate: orders, their line items, and the stock they consume.

mod commands;
mod service;

pub use commands::{
    AddLineItem, AssignSeller, CreateOrder, OrderLine, RemoveLineItem, UpdateLineItem,
};
pub use service::OrderService;
