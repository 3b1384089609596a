// HDBSCAN - hierarchical density-based clustering
//
// Pipeline:
// 1. Core distance of every point (distance to its min_samples-th neighbour,
//    counting the point itself)
// 2. Minimum spanning tree of the mutual-reachability graph (Prim, O(n²))
// 3. Single-linkage dendrogram from the sorted MST edges (union-find)
// 4. Condensed tree: splits smaller than min_cluster_size shed points
// 5. Excess-of-mass selection of the most stable clusters (root excluded)
//
// Points not covered by a selected cluster are noise (-1).
//
// References:
// - Campello, R., Moulavi, D. & Sander, J. (2013). Density-Based Clustering
//   Based on Hierarchical Density Estimates
// - McInnes, L. & Healy, J. (2017). Accelerated Hierarchical Density Based
//   Clustering

use ndarray::ArrayView2;

use crate::analysis::distance::pairwise_euclidean;

/// Label assigned to points outside every selected cluster
pub const NOISE: i64 = -1;

/// Smallest lambda denominator, so duplicate points get a finite density
const MIN_DISTANCE: f64 = 1e-12;

/// Merge recorded in the single-linkage dendrogram
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Condensed cluster hierarchy; cluster 0 is the root
#[derive(Debug, Default)]
struct CondensedTree {
    parent: Vec<usize>,
    birth: Vec<f64>,
    size: Vec<usize>,
    children: Vec<Vec<usize>>,
    point_cluster: Vec<usize>,
    point_lambda: Vec<f64>,
}

impl CondensedTree {
    fn add_cluster(&mut self, parent: usize, birth: f64, size: usize) -> usize {
        let id = self.parent.len();
        self.parent.push(parent);
        self.birth.push(birth);
        self.size.push(size);
        self.children.push(Vec::new());
        if id != parent {
            self.children[parent].push(id);
        }
        id
    }

    fn n_clusters(&self) -> usize {
        self.parent.len()
    }
}

/// HDBSCAN clusterer
#[derive(Debug, Clone)]
pub struct Hdbscan {
    pub min_cluster_size: usize,
    pub min_samples: usize,
}

impl Hdbscan {
    pub fn new(min_cluster_size: usize, min_samples: usize) -> Self {
        Self {
            min_cluster_size: min_cluster_size.max(2),
            min_samples: min_samples.max(1),
        }
    }

    /// Cluster the rows of `points`
    ///
    /// # Returns
    /// One label per row: `0..k` for clusters (ordered by discovery in the
    /// hierarchy), `-1` for noise.
    pub fn fit_predict(&self, points: ArrayView2<'_, f64>) -> Vec<i64> {
        let n = points.nrows();
        if n < 2 {
            return vec![NOISE; n];
        }

        let distances = pairwise_euclidean(points);
        let core: Vec<f64> = (0..n)
            .map(|i| {
                let mut row: Vec<f64> = distances.row(i).to_vec();
                row.sort_by(f64::total_cmp);
                row[self.min_samples.min(n) - 1]
            })
            .collect();
        let reach = |i: usize, j: usize| distances[[i, j]].max(core[i]).max(core[j]);

        let merges = single_linkage(n, minimum_spanning_tree(n, reach));
        let tree = self.condense(n, &merges);
        let selected = select_clusters(&tree);

        let mut numbering = vec![NOISE; tree.n_clusters()];
        let mut next = 0;
        for (cluster, &keep) in selected.iter().enumerate() {
            if keep {
                numbering[cluster] = next;
                next += 1;
            }
        }

        (0..n)
            .map(|p| {
                let mut cluster = tree.point_cluster[p];
                while cluster != 0 {
                    if selected[cluster] {
                        return numbering[cluster];
                    }
                    cluster = tree.parent[cluster];
                }
                NOISE
            })
            .collect()
    }

    fn condense(&self, n: usize, merges: &[Merge]) -> CondensedTree {
        let mut tree = CondensedTree {
            point_cluster: vec![0; n],
            point_lambda: vec![0.0; n],
            ..CondensedTree::default()
        };
        let root_node = n + merges.len() - 1;
        let root = tree.add_cluster(0, 0.0, n);

        let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };

        let mut stack = vec![(root_node, root)];
        while let Some((node, cluster)) = stack.pop() {
            if node < n {
                tree.point_cluster[node] = cluster;
                tree.point_lambda[node] = tree.birth[cluster];
                continue;
            }
            let merge = merges[node - n];
            let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
            let left_big = node_size(merge.left) >= self.min_cluster_size;
            let right_big = node_size(merge.right) >= self.min_cluster_size;

            match (left_big, right_big) {
                (true, true) => {
                    for child in [merge.left, merge.right] {
                        let id = tree.add_cluster(cluster, lambda, node_size(child));
                        stack.push((child, id));
                    }
                }
                (true, false) => {
                    shed(&mut tree, n, merges, merge.right, cluster, lambda);
                    stack.push((merge.left, cluster));
                }
                (false, true) => {
                    shed(&mut tree, n, merges, merge.left, cluster, lambda);
                    stack.push((merge.right, cluster));
                }
                (false, false) => {
                    shed(&mut tree, n, merges, merge.left, cluster, lambda);
                    shed(&mut tree, n, merges, merge.right, cluster, lambda);
                }
            }
        }
        tree
    }
}

/// Every leaf under `node` leaves `cluster` at `lambda`
fn shed(tree: &mut CondensedTree, n: usize, merges: &[Merge], node: usize, cluster: usize, lambda: f64) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current < n {
            tree.point_cluster[current] = cluster;
            tree.point_lambda[current] = lambda;
        } else {
            let merge = merges[current - n];
            stack.push(merge.left);
            stack.push(merge.right);
        }
    }
}

/// Prim's algorithm over the complete graph with weights `weight(i, j)`
fn minimum_spanning_tree(n: usize, weight: impl Fn(usize, usize) -> f64) -> Vec<(usize, usize, f64)> {
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = None;
        let mut next_weight = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let w = weight(current, j);
            if w < best[j] {
                best[j] = w;
                from[j] = current;
            }
            if best[j] < next_weight || next.is_none() {
                next_weight = best[j];
                next = Some(j);
            }
        }
        let Some(j) = next else { break };
        in_tree[j] = true;
        edges.push((from[j], j, best[j]));
        current = j;
    }
    edges
}

/// Single-linkage merges from MST edges; node ids `n..2n-1` are merges
fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut parent: Vec<usize> = (0..2 * n).collect();
    let mut size = vec![1usize; 2 * n];
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut merges = Vec::with_capacity(edges.len());
    for (a, b, distance) in edges {
        let left = find(&mut parent, a);
        let right = find(&mut parent, b);
        let node = n + merges.len();
        let merged = size[left] + size[right];
        parent[left] = node;
        parent[right] = node;
        size[node] = merged;
        merges.push(Merge {
            left,
            right,
            distance,
            size: merged,
        });
    }
    merges
}

/// Excess-of-mass selection; the root is never selected
fn select_clusters(tree: &CondensedTree) -> Vec<bool> {
    let k = tree.n_clusters();
    let mut stability = vec![0.0; k];
    for (p, &cluster) in tree.point_cluster.iter().enumerate() {
        stability[cluster] += tree.point_lambda[p] - tree.birth[cluster];
    }
    for child in 1..k {
        let parent = tree.parent[child];
        stability[parent] += tree.size[child] as f64 * (tree.birth[child] - tree.birth[parent]);
    }

    let mut selected = vec![false; k];
    for cluster in (1..k).rev() {
        let children = &tree.children[cluster];
        if children.is_empty() {
            selected[cluster] = true;
            continue;
        }
        let subtree: f64 = children.iter().map(|&c| stability[c]).sum();
        if subtree > stability[cluster] {
            stability[cluster] = subtree;
        } else {
            selected[cluster] = true;
            let mut stack = children.clone();
            while let Some(descendant) = stack.pop() {
                selected[descendant] = false;
                stack.extend(tree.children[descendant].iter().copied());
            }
        }
    }
    selected
}
