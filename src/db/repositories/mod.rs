mod meters;
mod profiles;
mod readings;
