mod http;
mod listeners;
mod scenario;
mod sign_in;
mod teardown;
mod validation;
