mod sessions;
mod violations;
