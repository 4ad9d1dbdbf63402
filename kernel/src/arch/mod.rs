// src/arch/mod.rs
// Abstraction d'architecture - Point d'entrée pour l'architecture spécifique

pub mod x86_64;
