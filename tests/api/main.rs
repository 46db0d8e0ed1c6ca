mod helpers;
mod users;
