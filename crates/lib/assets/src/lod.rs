// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Progressive mesh decimation.
//!
//! Each LOD is rebuilt from LOD0: rank triangles by area, keep everything
//! protected (boundary edges, sharp creases, UV seams), drop the smallest
//! until the target count, patch the holes with centroid fans and compact.

use std::collections::HashMap;

use glam::Vec3;
use log::{debug, warn};

use crate::{ModelVertex, RawLod, RawModel};

pub const MAX_LODS: usize = 8;

const SHARP_NDOT: f32 = 0.35;
const UV_SEAM_MAX: f32 = 1.0 / 64.0;
const MAX_LOOP_EDGES: u32 = 24;

#[derive(Debug, Clone, Copy)]
pub struct LodSettings {
    pub lod_count: u8,
    /// Per-level triangle ratio relative to LOD0. Zero or negative entries
    /// fall back to `0.5^level`; values above one are percentages.
    pub triangle_ratio: [f32; MAX_LODS],
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            lod_count: 4,
            triangle_ratio: [0.0; MAX_LODS],
        }
    }
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

fn settings_value_to_ratio(v: f32) -> f32 {
    if v <= 0.0 {
        0.0
    } else if v > 1.0 {
        clamp01(v / 100.0)
    } else {
        clamp01(v)
    }
}

fn effective_ratio(s: &LodSettings, level: u8, lod_count: u8) -> f32 {
    let mut total = settings_value_to_ratio(s.triangle_ratio[level as usize]);
    if total <= 0.0 {
        total = 0.5f32.powi(level as i32);
    }
    total = clamp01(total).max(0.001);
    if level == lod_count - 1 && total > 0.5 {
        total = 0.5;
    }
    total
}

fn safe_f(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

fn safe_v(v: [f32; 3]) -> Vec3 {
    Vec3::new(safe_f(v[0]), safe_f(v[1]), safe_f(v[2]))
}

/// Keeps triangles whose indices are in range and pairwise distinct.
fn sanitize_tris(indices: &[u32], vertex_count: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(indices.len());
    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
        if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
            continue;
        }
        if i0 == i1 || i1 == i2 || i0 == i2 {
            continue;
        }
        out.extend_from_slice(tri);
    }
    out
}

fn tri_area(v0: &ModelVertex, v1: &ModelVertex, v2: &ModelVertex) -> f32 {
    let a = safe_v(v1.position) - safe_v(v0.position);
    let b = safe_v(v2.position) - safe_v(v0.position);
    let c = a.cross(b);
    let a2 = c.length_squared();
    if !a2.is_finite() || a2 <= 0.0 {
        0.0
    } else {
        0.5 * a2.sqrt()
    }
}

fn ndot_edge(a: &ModelVertex, b: &ModelVertex) -> f32 {
    let an = safe_v(a.normal);
    let bn = safe_v(b.normal);
    let al2 = an.length_squared();
    let bl2 = bn.length_squared();
    if al2 <= 1e-20 || bl2 <= 1e-20 {
        return 1.0;
    }
    an.dot(bn) / (al2.sqrt() * bl2.sqrt())
}

fn uv_wrap_dist(a: f32, b: f32) -> f32 {
    let d0 = (a - b).abs();
    let d1 = ((a + 1.0) - b).abs();
    let d2 = ((a - 1.0) - b).abs();
    d0.min(d1).min(d2)
}

fn uv_seam_edge(a: &ModelVertex, b: &ModelVertex) -> bool {
    let du = uv_wrap_dist(safe_f(a.uv[0]), safe_f(b.uv[0]));
    let dv = uv_wrap_dist(safe_f(a.uv[1]), safe_f(b.uv[1]));
    du > UV_SEAM_MAX || dv > UV_SEAM_MAX
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

fn count_edges(indices: &[u32]) -> HashMap<(u32, u32), u32> {
    let mut counts = HashMap::with_capacity(indices.len());
    for tri in indices.chunks_exact(3) {
        for e in 0..3 {
            let a = tri[e];
            let b = tri[(e + 1) % 3];
            if a == b {
                continue;
            }
            *counts.entry(edge_key(a, b)).or_insert(0) += 1;
        }
    }
    counts
}

/// Walks one-use edges of the surviving mesh into closed loops. Only
/// degree-two vertices are walkable; anything else ends the walk and loops
/// shorter than three vertices are discarded.
fn build_boundary_loops(indices: &[u32], vertex_count: u32) -> Vec<Vec<u32>> {
    let counts = count_edges(indices);

    // Adjacency over boundary edges only.
    let mut adjacency: Vec<Vec<(u32, u32)>> = vec![Vec::new(); vertex_count as usize];
    let mut edge_count = 0u32;
    let mut seen = HashMap::new();
    for tri in indices.chunks_exact(3) {
        for e in 0..3 {
            let a = tri[e];
            let b = tri[(e + 1) % 3];
            if a == b || a >= vertex_count || b >= vertex_count {
                continue;
            }
            let key = edge_key(a, b);
            if counts.get(&key) != Some(&1) || seen.contains_key(&key) {
                continue;
            }
            let eid = edge_count;
            edge_count += 1;
            seen.insert(key, eid);
            adjacency[a as usize].push((b, eid));
            adjacency[b as usize].push((a, eid));
        }
    }

    let mut used = vec![false; edge_count as usize];
    let mut loops = Vec::new();

    for start in 0..vertex_count {
        for k in 0..adjacency[start as usize].len() {
            let (_, first_eid) = adjacency[start as usize][k];
            if used[first_eid as usize] {
                continue;
            }

            let mut loop_verts = Vec::new();
            let mut prev = u32::MAX;
            let mut cur = start;

            loop {
                loop_verts.push(cur);

                if adjacency[cur as usize].len() != 2 {
                    break;
                }

                let next = adjacency[cur as usize]
                    .iter()
                    .copied()
                    .find(|(to, _)| *to != prev);
                let Some((to, eid)) = next else {
                    break;
                };

                used[eid as usize] = true;
                prev = cur;
                cur = to;

                if cur == start {
                    break;
                }
            }

            if loop_verts.len() >= 3 {
                loops.push(loop_verts);
            }
        }
    }

    loops
}

fn compact(lod: &mut RawLod) {
    let vcount = lod.vertices.len();
    let mut used = vec![false; vcount];
    for &i in &lod.indices {
        if (i as usize) < vcount {
            used[i as usize] = true;
        }
    }

    let mut remap = vec![u32::MAX; vcount];
    let mut next = 0u32;
    for (i, flag) in used.iter().enumerate() {
        if *flag {
            remap[i] = next;
            next += 1;
        }
    }

    if next < 3 {
        return;
    }

    let mut vertices = Vec::with_capacity(next as usize);
    for (i, flag) in used.iter().enumerate() {
        if *flag {
            vertices.push(lod.vertices[i]);
        }
    }

    for i in lod.indices.iter_mut() {
        *i = if (*i as usize) < vcount { remap[*i as usize] } else { 0 };
    }

    lod.vertices = vertices;
}

fn build_lod(src: &RawLod, total_ratio: f32) -> Option<RawLod> {
    if src.vertices.len() < 3 || src.indices.len() < 3 {
        return None;
    }

    let vcount = src.vertices.len() as u32;
    let clean = sanitize_tris(&src.indices[..src.indices.len() - src.indices.len() % 3], vcount);
    if clean.len() < 3 {
        return None;
    }

    let tri0 = (clean.len() / 3) as u32;
    let mut r = clamp01(total_ratio);
    if r <= 0.0 {
        r = 0.5;
    }

    let target = ((tri0 as f32 * r).floor() as u32).clamp(1, tri0);
    if target == tri0 {
        return Some(RawLod {
            vertices: src.vertices.clone(),
            indices: clean,
        });
    }

    let edge_counts = count_edges(&clean);

    let mut protect = vec![false; tri0 as usize];
    let mut ranks: Vec<(f32, u32)> = Vec::with_capacity(tri0 as usize);
    let mut protected_count = 0u32;

    for (t, tri) in clean.chunks_exact(3).enumerate() {
        let v0 = &src.vertices[tri[0] as usize];
        let v1 = &src.vertices[tri[1] as usize];
        let v2 = &src.vertices[tri[2] as usize];

        let area = tri_area(v0, v1, v2).max(0.0);

        let mut p = false;
        for e in 0..3 {
            let ia = tri[e];
            let ib = tri[(e + 1) % 3];
            if edge_counts.get(&edge_key(ia, ib)) == Some(&1) {
                p = true;
                break;
            }
            let va = &src.vertices[ia as usize];
            let vb = &src.vertices[ib as usize];
            if ndot_edge(va, vb) < SHARP_NDOT || uv_seam_edge(va, vb) {
                p = true;
                break;
            }
        }

        protect[t] = p;
        if p {
            protected_count += 1;
        }
        ranks.push((area, t as u32));
    }

    let keep_target = target.max(protected_count);

    ranks.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep = protect.clone();
    let mut needed = keep_target.saturating_sub(protected_count);
    for (_, t) in ranks.iter().rev() {
        if needed == 0 {
            break;
        }
        if !keep[*t as usize] {
            keep[*t as usize] = true;
            needed -= 1;
        }
    }

    let mut out = RawLod {
        vertices: src.vertices.clone(),
        indices: Vec::with_capacity(keep_target as usize * 3),
    };
    for (t, tri) in clean.chunks_exact(3).enumerate() {
        if keep[t] {
            out.indices.extend_from_slice(tri);
        }
    }

    // Patch holes opened by the drop: fan each walkable boundary loop around
    // its centroid, sampling long loops down to MAX_LOOP_EDGES endpoints.
    let loops = build_boundary_loops(&out.indices, out.vertices.len() as u32);
    for loop_verts in &loops {
        let n = loop_verts.len() as u32;
        let step = if n > MAX_LOOP_EDGES {
            (n as f32 / MAX_LOOP_EDGES as f32).ceil() as u32
        } else {
            1
        };

        let sampled: Vec<u32> = (0..n)
            .step_by(step as usize)
            .map(|k| loop_verts[k as usize])
            .filter(|&v| (v as usize) < out.vertices.len())
            .collect();
        if sampled.len() < 3 {
            continue;
        }

        let inv = 1.0 / sampled.len() as f64;
        let mut cp = [0.0f64; 3];
        let mut cn = [0.0f64; 3];
        let mut cuv = [0.0f64; 2];
        for &vid in &sampled {
            let v = &out.vertices[vid as usize];
            for i in 0..3 {
                cp[i] += safe_f(v.position[i]) as f64;
                cn[i] += safe_f(v.normal[i]) as f64;
            }
            cuv[0] += safe_f(v.uv[0]) as f64;
            cuv[1] += safe_f(v.uv[1]) as f64;
        }

        let mut center = ModelVertex {
            position: [
                (cp[0] * inv) as f32,
                (cp[1] * inv) as f32,
                (cp[2] * inv) as f32,
            ],
            normal: [0.0, 0.0, 1.0],
            tangent: [0.0; 4],
            uv: [(cuv[0] * inv) as f32, (cuv[1] * inv) as f32],
        };
        let n3 = Vec3::new(
            (cn[0] * inv) as f32,
            (cn[1] * inv) as f32,
            (cn[2] * inv) as f32,
        );
        if n3.length_squared() > 1e-20 {
            center.normal = n3.normalize().to_array();
        }

        let center_id = out.vertices.len() as u32;
        out.vertices.push(center);

        for pair in sampled.windows(2) {
            out.indices.extend_from_slice(&[center_id, pair[0], pair[1]]);
        }
        out.indices
            .extend_from_slice(&[center_id, sampled[sampled.len() - 1], sampled[0]]);
    }

    out.indices.truncate(out.indices.len() - out.indices.len() % 3);
    compact(&mut out);

    if out.vertices.len() < 3 || out.indices.len() < 3 {
        return None;
    }

    Some(out)
}

/// Rebuilds every submesh's LOD chain from its LOD0. On a per-level failure
/// the previous level is cloned so the chain stays dense; afterwards the
/// model's `lod_count` is clamped to the minimum across submeshes.
pub fn generate_lods(raw: &mut RawModel, settings: &LodSettings) -> bool {
    let target_lod_count = settings.lod_count.clamp(1, MAX_LODS as u8);

    let mut ok_all = true;
    let mut min_lods = usize::MAX;

    for sm in raw.submeshes.iter_mut() {
        if sm.lods.is_empty() {
            ok_all = false;
            continue;
        }

        sm.lods.truncate(1);

        let lod0_usable = {
            let lod0 = &sm.lods[0];
            lod0.vertices.len() >= 3 && lod0.indices.len() >= 3
        };
        if !lod0_usable {
            ok_all = false;
            min_lods = min_lods.min(sm.lods.len());
            continue;
        }

        for level in 1..target_lod_count {
            let ratio = effective_ratio(settings, level, target_lod_count);
            let built = build_lod(&sm.lods[0], ratio);
            match built {
                Some(lod) => sm.lods.push(lod),
                None => {
                    ok_all = false;
                    warn!("lod {level} generation failed, cloning previous level");
                    let prev = sm.lods[sm.lods.len() - 1].clone();
                    sm.lods.push(prev);
                }
            }
        }

        min_lods = min_lods.min(sm.lods.len());
    }

    if min_lods == usize::MAX {
        min_lods = 1;
    }
    let min_lods = min_lods.clamp(1, MAX_LODS);

    for sm in raw.submeshes.iter_mut() {
        sm.lods.truncate(min_lods);
    }

    raw.lod_count = min_lods as u8;
    if raw.lod_count != target_lod_count {
        ok_all = false;
    }

    for (i, sm) in raw.submeshes.iter().enumerate() {
        let tris: Vec<u32> = sm.lods.iter().map(|l| l.triangle_count()).collect();
        debug!("submesh {i}: lod triangles {tris:?}");
    }

    ok_all
}

#[cfg(test)]
mod test {
    use crate::{
        lod::{
            build_boundary_loops, build_lod, effective_ratio, generate_lods, sanitize_tris,
            LodSettings,
        },
        ModelVertex, RawLod, RawModel, RawSubmesh,
    };

    fn vertex(x: f32, y: f32, z: f32) -> ModelVertex {
        ModelVertex::from_position([x, y, z])
    }

    /// Unit cube: 8 shared corners, 12 triangles, no normals or uvs so no
    /// protection kicks in.
    fn cube_lod() -> RawLod {
        let vertices = vec![
            vertex(0.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0),
            vertex(1.0, 1.0, 0.0),
            vertex(0.0, 1.0, 0.0),
            vertex(0.0, 0.0, 1.0),
            vertex(1.0, 0.0, 1.0),
            vertex(1.0, 1.0, 1.0),
            vertex(0.0, 1.0, 1.0),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 0, 3, 2, // bottom
            4, 5, 6, 4, 6, 7, // top
            0, 1, 5, 0, 5, 4, // front
            2, 3, 7, 2, 7, 6, // back
            1, 2, 6, 1, 6, 5, // right
            3, 0, 4, 3, 4, 7, // left
        ];
        RawLod { vertices, indices }
    }

    /// A fan of triangles along a strip; every triangle touches the outer
    /// boundary so every triangle is protected.
    fn strip_lod(count: u32) -> RawLod {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for i in 0..=count {
            vertices.push(vertex(i as f32, 0.0, 0.0));
            vertices.push(vertex(i as f32, 1.0, 0.0));
        }
        for i in 0..count {
            let b = i * 2;
            indices.extend_from_slice(&[b, b + 2, b + 1]);
            indices.extend_from_slice(&[b + 1, b + 2, b + 3]);
        }
        RawLod { vertices, indices }
    }

    #[test]
    fn sanitize_drops_degenerates() {
        let indices = vec![0, 1, 2, 0, 0, 1, 1, 2, 9];
        assert_eq!(vec![0, 1, 2], sanitize_tris(&indices, 3));
    }

    #[test]
    fn ratio_defaults_halve_per_level() {
        let s = LodSettings::default();
        assert_eq!(0.5, effective_ratio(&s, 1, 4));
        assert_eq!(0.25, effective_ratio(&s, 2, 4));
        assert_eq!(0.125, effective_ratio(&s, 3, 4));
    }

    #[test]
    fn final_level_is_capped() {
        let mut s = LodSettings::default();
        s.triangle_ratio[1] = 0.9;
        assert_eq!(0.5, effective_ratio(&s, 1, 2));
        assert_eq!(0.9, effective_ratio(&s, 1, 3));
    }

    #[test]
    fn percent_ratios() {
        let mut s = LodSettings::default();
        s.triangle_ratio[1] = 30.0;
        assert!((effective_ratio(&s, 1, 4) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn full_ratio_is_identity_after_sanitize() {
        let src = cube_lod();
        let out = build_lod(&src, 1.0).unwrap();
        assert_eq!(src.vertices, out.vertices);
        assert_eq!(src.indices, out.indices);
    }

    #[test]
    fn protected_strip_keeps_every_triangle() {
        let src = strip_lod(8);
        let out = build_lod(&src, 0.25).unwrap();
        // All 16 triangles touch the rim, so all are protected; the open rim
        // itself (18 vertices) is then fanned around a centroid.
        assert_eq!(16 + 18, out.indices.len() / 3);
        assert_eq!(18 + 1, out.vertices.len());
        for tri in src.indices.chunks_exact(3) {
            let found = out.indices.chunks_exact(3).any(|t| t == tri);
            assert!(found, "protected triangle {tri:?} was dropped");
        }
    }

    #[test]
    fn cube_decimation_respects_target_and_stays_clean() {
        let src = cube_lod();
        // Closed mesh: no one-use edges in the input.
        assert!(build_boundary_loops(&src.indices, src.vertices.len() as u32).is_empty());

        let out = build_lod(&src, 0.5).unwrap();
        let tris = out.indices.len() / 3;
        assert!(tris >= 6, "kept {tris} triangles");
        assert!(tris <= 36);

        // Every vertex referenced, every triangle non-degenerate.
        let mut used = vec![false; out.vertices.len()];
        for tri in out.indices.chunks_exact(3) {
            assert!(tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]);
            for &i in tri {
                used[i as usize] = true;
            }
        }
        assert!(used.iter().all(|u| *u));
    }

    #[test]
    fn single_triangle_never_drops_below_one() {
        let src = RawLod {
            vertices: vec![vertex(0.0, 0.0, 0.0), vertex(1.0, 0.0, 0.0), vertex(0.0, 1.0, 0.0)],
            indices: vec![0, 1, 2],
        };
        let out = build_lod(&src, 0.3).unwrap();
        assert_eq!(3, out.indices.len());
    }

    #[test]
    fn boundary_loop_of_single_hole() {
        // Two triangles forming a quad; drop nothing, the outer boundary is
        // the quad rim with corner degrees of two.
        let quad = RawLod {
            vertices: vec![
                vertex(0.0, 0.0, 0.0),
                vertex(1.0, 0.0, 0.0),
                vertex(1.0, 1.0, 0.0),
                vertex(0.0, 1.0, 0.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        };
        let loops = build_boundary_loops(&quad.indices, 4);
        assert_eq!(1, loops.len());
        assert_eq!(4, loops[0].len());
    }

    #[test]
    fn generate_clamps_to_min_across_submeshes() {
        let mut raw = RawModel::new();
        raw.submeshes.push(RawSubmesh::from_lod0(cube_lod()));
        raw.submeshes.push(RawSubmesh::from_lod0(strip_lod(4)));

        let settings = LodSettings {
            lod_count: 3,
            ..Default::default()
        };
        generate_lods(&mut raw, &settings);

        assert_eq!(3, raw.lod_count);
        for sm in &raw.submeshes {
            assert_eq!(3, sm.lods.len());
            for lod in &sm.lods {
                assert!(lod.triangle_count() >= 1);
                assert_eq!(0, lod.indices.len() % 3);
            }
        }
    }

    #[test]
    fn degenerate_submesh_falls_back() {
        let mut raw = RawModel::new();
        let broken = RawSubmesh::from_lod0(RawLod {
            vertices: vec![vertex(0.0, 0.0, 0.0)],
            indices: vec![0, 0, 0],
        });
        raw.submeshes.push(broken);

        let ok = generate_lods(&mut raw, &LodSettings::default());
        assert!(!ok);
        assert_eq!(1, raw.lod_count);
        assert_eq!(1, raw.submeshes[0].lods.len());
    }
}
