mod custom;
mod derive;
mod filtering;
mod models;
mod params;
mod relations;
mod scopes;
mod silent;
