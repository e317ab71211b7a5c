//! Step-by-step wizard over the catalog.
//!
//! A user is in at most one [`Mode`] at a time and moves through its
//! [`Step`]s by pressing reply-keyboard buttons. `Back` and `Menu` work
//! from every step.

mod dispatcher;
mod labels;
mod steps;

pub use dispatcher::{Caller, Dispatcher, Outcome};
pub use labels::{
    ADD_PUBLISHER, BACK, CONFIRM_NO, CONFIRM_YES, DONE, MENU, NEXT_PAGE, Nav, PAGE_SIZE, PREV_PAGE,
    main_menu,
};
pub use steps::{Mode, Step};
