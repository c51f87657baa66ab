//! Gate-level abstraction manager.
//!
//! One `GlaMan` is created per abstraction run. It owns the SAT solver, the
//! CNF templates, the frame-variable map, the abstraction set, the
//! clause-to-object map, and the refinement manager; the AIG is borrowed.
//! Objects live in a flat arena and every cross-reference is an index.

mod abstraction;
mod core;
mod driver;
mod frames;
mod frontier;
mod loader;

pub use abstraction::Abstraction;
pub use driver::{gla_perform, gla_perform_mapped, gla_refine_with_cex, GlaOutcome, GlaResult};
pub use frames::FrameMap;

use anyhow::{ensure, Result};
use cegar_aig::Aig;
use cegar_sat::Solver;

use crate::cnf::{self, CnfData};
use crate::params::GlaParams;
use crate::refine::RnmMan;

pub const NO_GLA: u32 = u32::MAX;

/// Gate-local descriptor of one abstractable object.
///
/// `fanins` holds the variables appearing in the object's CNF template other
/// than the object itself; LUT-sized, so at most four.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlaObj {
    pub aig_id: u32,
    pub is_const: bool,
    pub is_pi: bool,
    pub is_po: bool,
    pub is_ro: bool,
    pub is_ri: bool,
    pub is_and: bool,
    /// Scratch mark used by the region filters.
    pub mark: bool,
    /// Complement of the primary fanin; for flop outputs this is the
    /// polarity of the flop input's fanin.
    pub fanin_compl0: bool,
    pub n_fanins: u8,
    pub fanins: [u32; 4],
}

impl GlaObj {
    pub fn fanins(&self) -> &[u32] {
        &self.fanins[..self.n_fanins as usize]
    }
}

pub struct GlaMan<'a> {
    pub(crate) aig: &'a Aig,
    pub(crate) params: GlaParams,
    /// Clause templates with literals in GLA-id space.
    pub(crate) cnf: CnfData,
    /// Flat arena; index 0 is an unused sentinel, ids start at 1.
    pub(crate) objs: Vec<GlaObj>,
    pub(crate) obj2gla: Vec<u32>,
    /// GLA id of the property output.
    pub(crate) root: u32,
    pub(crate) abs: Abstraction,
    pub(crate) frames: FrameMap,
    pub(crate) solver: Solver,
    /// Originating GLA object of every solver clause; always exactly as long
    /// as the solver's clause list.
    pub(crate) clause_map: Vec<i32>,
    /// Newly-included objects of the previous frame's UNSAT core.
    pub(crate) prev_core: Option<Vec<u32>>,
    pub(crate) rnm: RnmMan<'a>,
    pub(crate) explore_round: u32,
    pub(crate) region_round: u32,
    pub(crate) n_cexes: u64,
    /// Latest gate-class snapshot kept when intermediate dumping is on.
    pub(crate) intermediate: Option<Vec<bool>>,
}

impl<'a> GlaMan<'a> {
    /// Starts a manager over a plain AIG: every object gets a CNF template
    /// and a GLA descriptor.
    pub fn new(aig: &'a Aig, gate_classes: &[bool], params: GlaParams) -> Result<Self> {
        let cnf = CnfData::derive(aig);
        Self::from_cnf(aig, cnf, gate_classes, params)
    }

    /// Starts a manager over an AIG whose CNF was derived externally (the
    /// LUT-mapped flow): objects without templates get no GLA descriptor.
    pub fn from_cnf(
        aig: &'a Aig,
        mut cnf: CnfData,
        gate_classes: &[bool],
        params: GlaParams,
    ) -> Result<Self> {
        ensure!(
            aig.po_count() == 1,
            "gate-level abstraction expects a single property output, found {}",
            aig.po_count()
        );
        ensure!(
            gate_classes.len() == aig.object_count(),
            "gate-class vector length {} does not match the AIG ({} objects)",
            gate_classes.len(),
            aig.object_count()
        );
        ensure!(
            cnf.object_count() == aig.object_count(),
            "CNF template table does not cover the AIG"
        );

        // Number the abstractable objects; id 0 stays a sentinel.
        let mut obj2gla = vec![NO_GLA; aig.object_count()];
        let mut n_objs = 1u32;
        for id in 0..aig.object_count() {
            if cnf.clause_count(id) >= 0 {
                obj2gla[id] = n_objs;
                n_objs += 1;
            }
        }
        // Re-express template literals in GLA variables.
        cnf.remap_lits(&obj2gla)?;

        let mut objs = vec![GlaObj::default(); n_objs as usize];
        for id in 0..aig.object_count() {
            let gla = obj2gla[id];
            if gla == NO_GLA {
                continue;
            }
            let obj = &mut objs[gla as usize];
            obj.aig_id = id as u32;
            obj.is_const = aig.is_const0(id);
            obj.is_pi = aig.is_pi(id);
            obj.is_po = aig.is_po(id);
            obj.is_ro = aig.is_ro(id);
            obj.is_ri = aig.is_ri(id);
            obj.is_and = aig.is_and(id);
            if obj.is_const || obj.is_pi {
                continue;
            }
            if obj.is_ro {
                let ri = aig.ro_to_ri(id);
                let fanin = aig.fanin0(ri);
                let fanin_gla = obj2gla[fanin.id()];
                ensure!(fanin_gla != NO_GLA, "flop {id} is driven by an unmapped node");
                obj.n_fanins = 1;
                obj.fanins[0] = fanin_gla;
                obj.fanin_compl0 = fanin.is_complement();
                continue;
            }
            if aig.is_co(id) {
                obj.fanin_compl0 = aig.fanin0(id).is_complement();
            }
            // AND or CO: fanins are the template variables besides our own.
            let mut fanins: Vec<u32> = Vec::with_capacity(4);
            let push = |var: u32, fanins: &mut Vec<u32>| {
                if var != gla && !fanins.contains(&var) {
                    fanins.push(var);
                }
            };
            for clause in cnf.object_clauses(id) {
                for &lit in clause {
                    push(cnf::lit_var(lit) as u32, &mut fanins);
                }
            }
            fanins.sort_unstable();
            ensure!(fanins.len() <= 4, "object {id} has more than 4 CNF fanins");
            obj.n_fanins = fanins.len() as u8;
            obj.fanins[..fanins.len()].copy_from_slice(&fanins);
        }

        let root = obj2gla[aig.po(0)];
        ensure!(root != NO_GLA, "the property output has no GLA descriptor");

        // Seed the abstraction: the constant is always included, then every
        // flagged AND and flop output, in id order.
        let mut abs = Abstraction::new(n_objs as usize);
        abs.add(obj2gla[0]);
        for id in 1..aig.object_count() {
            let gla = obj2gla[id];
            if gla != NO_GLA && gate_classes[id] && (aig.is_and(id) || aig.is_ro(id)) {
                abs.add(gla);
            }
        }

        let rnm = RnmMan::new(aig)?;
        Ok(Self {
            aig,
            params,
            cnf,
            frames: FrameMap::new(n_objs as usize),
            objs,
            obj2gla,
            root,
            abs,
            solver: Solver::new(),
            clause_map: Vec::new(),
            prev_core: None,
            rnm,
            explore_round: 0,
            region_round: 0,
            n_cexes: 0,
            intermediate: None,
        })
    }

    pub fn num_objs(&self) -> usize {
        self.objs.len()
    }

    pub fn abstraction(&self) -> &Abstraction {
        &self.abs
    }

    /// Gate-class snapshot kept by intermediate dumping, if any.
    pub fn intermediate_classes(&self) -> Option<&[bool]> {
        self.intermediate.as_deref()
    }

    pub(crate) fn obj(&self, gla: u32) -> &GlaObj {
        &self.objs[gla as usize]
    }

    /// Members of the abstraction with the given kind, for reporting.
    pub fn abs_count(&self, ro_only: bool, and_only: bool) -> usize {
        self.abs
            .order()
            .iter()
            .filter(|&&gla| {
                let obj = self.obj(gla);
                (!ro_only || obj.is_ro) && (!and_only || obj.is_and)
            })
            .count()
    }

    /// SAT value of an object in a frame; 0 when no variable exists.
    pub(crate) fn sat_value(&self, gla: u32, frame: usize) -> bool {
        let var = self.frames.var(gla, frame);
        var > 0 && self.solver.var_value(var as usize)
    }

    /// Derives the gate-class vector of the current abstraction over the
    /// working AIG: the constant, every included object, the internal nodes
    /// of included LUT cones, and the property outputs.
    pub fn translate(&self) -> Vec<bool> {
        let mut classes = vec![false; self.aig.object_count()];
        classes[0] = true;
        for po in 0..self.aig.po_count() {
            classes[self.aig.po(po)] = true;
        }
        // Epoch marks local to this call; the AIG is not touched.
        let mut marked = vec![false; self.aig.object_count()];
        for &gla in self.abs.order() {
            let obj = *self.obj(gla);
            classes[obj.aig_id as usize] = true;
            if obj.is_const || obj.is_ro {
                continue;
            }
            debug_assert!(obj.is_and);
            // Mark the cut leaves, then everything between them and the
            // root: for plain ANDs this is just the node itself, for mapped
            // cones it recovers the interior.
            for &fanin in obj.fanins() {
                marked[self.obj(fanin).aig_id as usize] = true;
            }
            let mut stack = vec![obj.aig_id as usize];
            let mut interior = Vec::new();
            while let Some(id) = stack.pop() {
                if marked[id] || self.aig.is_ci(id) || self.aig.is_const0(id) {
                    continue;
                }
                marked[id] = true;
                interior.push(id);
                classes[id] = true;
                stack.push(self.aig.fanin0(id).id());
                stack.push(self.aig.fanin1(id).id());
            }
            for &fanin in obj.fanins() {
                marked[self.obj(fanin).aig_id as usize] = false;
            }
            for id in interior {
                marked[id] = false;
            }
        }
        classes
    }
}
