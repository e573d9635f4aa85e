#![allow(dead_code)]

use std::path::Path;

use cranbert::{Document, Encoder, Engine, IndexPaths, ModelManager, Result};

pub const HASHING_MODEL: &str = "test/hashing-bow";

/// Deterministic bag-of-words encoder: every word of three or more
/// characters is hashed (FNV-1a) into one of `dim` buckets, then the vector
/// is L2-normalized.
pub struct HashingEncoder {
    pub id: String,
    pub dim: usize,
}

impl HashingEncoder {
    pub fn new() -> Self {
        Self {
            id: HASHING_MODEL.to_string(),
            dim: 16,
        }
    }

    pub fn named(id: &str) -> Self {
        Self {
            id: id.to_string(),
            dim: 16,
        }
    }
}

fn fnv1a(word: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl Encoder for HashingEncoder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dim];
                for word in text
                    .to_lowercase()
                    .split(|c: char| !c.is_ascii_alphanumeric())
                    .filter(|w| w.len() > 2)
                {
                    v[(fnv1a(word) % self.dim as u64) as usize] += 1.0;
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    v.iter_mut().for_each(|x| *x /= norm);
                }
                v
            })
            .collect())
    }
}

pub fn hashing_model() -> ModelManager {
    ModelManager::with_encoder(Box::new(HashingEncoder::new()))
}

/// The three-document corpus used throughout the ranking examples.
pub fn example_docs() -> Vec<Document> {
    vec![
        Document::new("1", "", "gas turbine blade stress"),
        Document::new("2", "", "turbulence in boundary layer flow"),
        Document::new("3", "", "stress analysis of aircraft wing"),
    ]
}

/// A slightly larger set of aeronautics abstracts.
pub fn aero_docs() -> Vec<Document> {
    vec![
        Document::new(
            "1",
            "Experimental investigation of the aerodynamics of a wing in a slipstream",
            "an experimental study of a wing in a propeller slipstream was made in order to determine the spanwise distribution of the lift increase due to slipstream",
        ),
        Document::new(
            "2",
            "Simple shear flow past a flat plate in an incompressible fluid of small viscosity",
            "in the study of high speed viscous flow past a two dimensional body it is usually necessary to consider a curved shock wave emitting from the nose",
        ),
        Document::new(
            "3",
            "The boundary layer in simple shear flow past a flat plate",
            "the boundary layer equations are presented for steady incompressible flow with no pressure gradient",
        ),
        Document::new(
            "4",
            "Approximate solutions of the incompressible laminar boundary layer equations for a plate in shear flow",
            "the two dimensional steady boundary layer problem for a flat plate in a shear flow of incompressible fluid is considered",
        ),
        Document::new(
            "5",
            "One dimensional transient heat conduction into a double layer slab subjected to a linear heat input",
            "a solution is presented for the transient heat conduction in a composite slab exposed to aerodynamic heating",
        ),
        Document::new(
            "6",
            "Heat transfer in high speed flight",
            "the heat transfer to a flat plate and to a cone at supersonic speeds is estimated including the effect of shock waves",
        ),
    ]
}

pub fn paths(dir: &Path) -> IndexPaths {
    IndexPaths {
        lexical: dir.join("lexical.redb"),
        semantic: dir.join("embeddings.redb"),
    }
}

pub fn open_engine(dir: &Path, docs: &Vec<Document>) -> Engine {
    Engine::open(&paths(dir), docs, hashing_model(), false).unwrap()
}
