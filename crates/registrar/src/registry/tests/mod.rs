mod common;

mod eligibility;
mod settlement;
